pub mod dispatcher;
pub mod logging_notifier;

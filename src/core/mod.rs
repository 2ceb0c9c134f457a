pub mod journal;
pub mod orchestrator;
pub mod services;
pub mod state_machine;
pub mod withdrawal;

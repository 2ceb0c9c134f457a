pub mod amount;
pub mod ids;

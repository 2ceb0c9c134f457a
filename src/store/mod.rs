pub mod memory;
pub mod simulated_rail;

pub mod eligibility;
pub mod pin;

pub mod handlers;
pub mod referral_program;

pub mod referral_code;
pub mod reward_percentage;

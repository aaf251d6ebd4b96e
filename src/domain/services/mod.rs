pub mod code_issuer;
pub mod customer_stats;
pub mod promo_sweep;
pub mod referral_recorder;
pub mod tracking_lifecycle;

/// Share of the referred order paid out as a reward, in percent
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct RewardPercentage(f64);

impl RewardPercentage {
    pub const DEFAULT: f64 = 10.0;

    pub fn new(value: f64) -> Result<Self, String> {
        if !value.is_finite() {
            return Err("Reward percentage must be finite".to_string());
        }
        if !(0.0..=100.0).contains(&value) {
            return Err("Reward percentage must be between 0 and 100".to_string());
        }
        Ok(RewardPercentage(value))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl Default for RewardPercentage {
    fn default() -> Self {
        RewardPercentage(Self::DEFAULT)
    }
}

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PanelError, Result};

/// Reduces a series to the single value shown by pie slices and legends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CalculationType {
    First,
    Last,
    FirstNumber,
    #[default]
    LastNumber,
    Mean,
    Sum,
    Min,
    Max,
}

impl CalculationType {
    pub fn calculate(self, values: &[Option<f64>]) -> Option<f64> {
        let mut numbers = values.iter().filter_map(|v| v.filter(|n| !n.is_nan()));
        match self {
            Self::First => values.first().copied().flatten(),
            Self::Last => values.last().copied().flatten(),
            Self::FirstNumber => numbers.next(),
            Self::LastNumber => numbers.next_back(),
            Self::Mean => {
                let (sum, count) = numbers.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
                (count > 0).then(|| sum / count as f64)
            }
            Self::Sum => numbers.reduce(|a, b| a + b),
            Self::Min => numbers.reduce(f64::min),
            Self::Max => numbers.reduce(f64::max),
        }
    }
}

impl FromStr for CalculationType {
    type Err = PanelError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "first" => Ok(Self::First),
            "last" => Ok(Self::Last),
            "first-number" => Ok(Self::FirstNumber),
            "last-number" => Ok(Self::LastNumber),
            "mean" => Ok(Self::Mean),
            "sum" => Ok(Self::Sum),
            "min" => Ok(Self::Min),
            "max" => Ok(Self::Max),
            _ => Err(PanelError::Parse(format!("unknown calculation: {s}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALUES: [Option<f64>; 5] = [None, Some(4.0), Some(1.0), Some(7.0), None];

    #[test]
    fn positional_calculations_keep_gaps() {
        assert_eq!(CalculationType::First.calculate(&VALUES), None);
        assert_eq!(CalculationType::Last.calculate(&VALUES), None);
        assert_eq!(CalculationType::FirstNumber.calculate(&VALUES), Some(4.0));
        assert_eq!(CalculationType::LastNumber.calculate(&VALUES), Some(7.0));
    }

    #[test]
    fn aggregate_calculations_skip_gaps() {
        assert_eq!(CalculationType::Mean.calculate(&VALUES), Some(4.0));
        assert_eq!(CalculationType::Sum.calculate(&VALUES), Some(12.0));
        assert_eq!(CalculationType::Min.calculate(&VALUES), Some(1.0));
        assert_eq!(CalculationType::Max.calculate(&VALUES), Some(7.0));
    }

    #[test]
    fn empty_series_has_no_value() {
        assert_eq!(CalculationType::Sum.calculate(&[]), None);
        assert_eq!(CalculationType::Mean.calculate(&[None]), None);
    }

    #[test]
    fn parses_names() {
        assert_eq!(
            "last-number".parse::<CalculationType>().unwrap(),
            CalculationType::LastNumber
        );
        assert!("median".parse::<CalculationType>().is_err());
    }
}

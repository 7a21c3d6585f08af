use crate::SchedulerError;
use std::fmt;
use std::str::FromStr;

/// Operations the fabric has PR bitstreams for.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationType {
    Filter,
    Join,
    MergeSort,
    LinearSort,
    Addition,
    Multiplication,
    AggregationSum,
    Sobel,
    BlackWhite,
}

impl OperationType {
    /// All operation types in declaration order.
    pub fn all() -> [OperationType; 9] {
        [
            OperationType::Filter,
            OperationType::Join,
            OperationType::MergeSort,
            OperationType::LinearSort,
            OperationType::Addition,
            OperationType::Multiplication,
            OperationType::AggregationSum,
            OperationType::Sobel,
            OperationType::BlackWhite,
        ]
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            OperationType::Filter => "Filter",
            OperationType::Join => "Join",
            OperationType::MergeSort => "MergeSort",
            OperationType::LinearSort => "LinearSort",
            OperationType::Addition => "Addition",
            OperationType::Multiplication => "Multiplication",
            OperationType::AggregationSum => "AggregationSum",
            OperationType::Sobel => "Sobel",
            OperationType::BlackWhite => "BlackWhite",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for OperationType {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationType::all()
            .iter()
            .find(|op| op.to_string().eq_ignore_ascii_case(s.trim()))
            .copied()
            .ok_or_else(|| SchedulerError::ValidationError(format!("Unknown operation {}", s)))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_display_from_str() {
        for op in OperationType::all().iter() {
            assert_eq!(op.to_string().parse::<OperationType>().unwrap(), *op);
        }
        assert_eq!(
            "mergesort".parse::<OperationType>().unwrap(),
            OperationType::MergeSort
        );
        assert!("Projection".parse::<OperationType>().is_err());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&OperationType::AggregationSum).unwrap();
        assert_eq!(json, "\"AggregationSum\"");
        let op: OperationType = serde_json::from_str("\"LinearSort\"").unwrap();
        assert_eq!(op, OperationType::LinearSort);
    }
}

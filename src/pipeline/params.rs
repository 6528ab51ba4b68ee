use crate::ingest::ValidationError;
use serde::{Deserialize, Serialize};

pub const CONTAMINATION_MIN: f64 = 0.01;
pub const CONTAMINATION_MAX: f64 = 0.20;
pub const CONTAMINATION_DEFAULT: f64 = 0.05;

/// Parameters as submitted by a user; anything left out takes its default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParamRequest {
    #[serde(default)]
    pub feature_x: Option<String>,
    #[serde(default)]
    pub feature_y: Option<String>,
    #[serde(default)]
    pub contamination: Option<f64>,
}

/// Fully resolved analysis parameters for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisParams {
    pub feature_x: String,
    pub feature_y: String,
    pub contamination: f64,
}

impl AnalysisParams {
    /// Fill in defaults from the numeric column set and range-check the
    /// contamination rate.
    ///
    /// Feature names are passed through unchecked; scoring reports unknown or
    /// non-numeric columns. Both features may name the same column.
    pub fn resolve(request: &ParamRequest, numeric_columns: &[String]) -> Result<Self, ValidationError> {
        if numeric_columns.is_empty() {
            return Err(ValidationError::TooFewNumericColumns { found: 0 });
        }
        let pick = |requested: &Option<String>, default_idx: usize| {
            requested
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| numeric_columns[default_idx.min(numeric_columns.len() - 1)].clone())
        };

        let contamination = request.contamination.unwrap_or(CONTAMINATION_DEFAULT);
        if !(CONTAMINATION_MIN..=CONTAMINATION_MAX).contains(&contamination) {
            return Err(ValidationError::ContaminationOutOfRange {
                value: contamination,
                min: CONTAMINATION_MIN,
                max: CONTAMINATION_MAX,
            });
        }

        Ok(Self {
            feature_x: pick(&request.feature_x, 0),
            feature_y: pick(&request.feature_y, 1),
            contamination,
        })
    }

    /// Same parameters in request form, for links that re-run the pipeline.
    pub fn to_request(&self) -> ParamRequest {
        ParamRequest {
            feature_x: Some(self.feature_x.clone()),
            feature_y: Some(self.feature_y.clone()),
            contamination: Some(self.contamination),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols() -> Vec<String> {
        vec!["a".into(), "b".into(), "c".into()]
    }

    #[test]
    fn test_defaults() {
        let p = AnalysisParams::resolve(&ParamRequest::default(), &cols()).unwrap();
        assert_eq!(p.feature_x, "a");
        assert_eq!(p.feature_y, "b");
        assert_eq!(p.contamination, 0.05);
    }

    #[test]
    fn test_blank_names_fall_back_to_defaults() {
        let req = ParamRequest {
            feature_x: Some("  ".into()),
            feature_y: Some("c".into()),
            contamination: None,
        };
        let p = AnalysisParams::resolve(&req, &cols()).unwrap();
        assert_eq!(p.feature_x, "a");
        assert_eq!(p.feature_y, "c");
    }

    #[test]
    fn test_same_feature_twice_is_allowed() {
        let req = ParamRequest {
            feature_x: Some("b".into()),
            feature_y: Some("b".into()),
            contamination: Some(0.1),
        };
        let p = AnalysisParams::resolve(&req, &cols()).unwrap();
        assert_eq!(p.feature_x, p.feature_y);
    }

    #[test]
    fn test_contamination_bounds_inclusive() {
        for c in [0.01, 0.2] {
            let req = ParamRequest {
                contamination: Some(c),
                ..Default::default()
            };
            assert!(AnalysisParams::resolve(&req, &cols()).is_ok(), "{c} rejected");
        }
        for c in [0.0, 0.009, 0.21, f64::NAN] {
            let req = ParamRequest {
                contamination: Some(c),
                ..Default::default()
            };
            assert!(AnalysisParams::resolve(&req, &cols()).is_err(), "{c} accepted");
        }
    }

    #[test]
    fn test_single_column_default_y() {
        let p = AnalysisParams::resolve(&ParamRequest::default(), &["only".to_string()]).unwrap();
        assert_eq!(p.feature_y, "only");
    }
}

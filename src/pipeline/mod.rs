//! One full analysis run: parse -> validate -> resolve parameters -> score.
//!
//! A run is a pure function of the uploaded bytes and the requested
//! parameters. Nothing is cached between runs; every parameter change simply
//! runs the whole pipeline again.

mod params;

pub use self::params::{
    AnalysisParams, ParamRequest, CONTAMINATION_DEFAULT, CONTAMINATION_MAX, CONTAMINATION_MIN,
};

use crate::detect::{Label, Prediction, Scorer, ScoringError, DEFAULT_SEED};
use crate::ingest::{self, Dataset, ParseError, ValidationError, Value};
use crate::report::AnomalyTable;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

/// Name of the derived column holding the scorer's raw `+1` / `-1` output.
pub const SCORE_COLUMN: &str = "anomaly_score";
/// Name of the derived column holding the row label.
pub const STATUS_COLUMN: &str = "Status";

/// Errors that halt a run. Validation failures are not errors; they are a
/// regular [`RunResult`].
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Scoring(#[from] ScoringError),
}

/// Outcome of a run that got past parsing.
#[derive(Debug)]
pub enum RunResult {
    /// The file parsed but cannot be analysed as requested.
    ValidationFailed {
        dataset: Dataset,
        reason: ValidationError,
    },
    Scored(ScoredDataset),
}

/// What the results section should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultsOutcome {
    NoAnomalies,
    Anomalies { count: usize },
}

/// The dataset together with one prediction per row.
#[derive(Debug, Clone)]
pub struct ScoredDataset {
    dataset: Dataset,
    numeric_columns: Vec<String>,
    params: AnalysisParams,
    predictions: Vec<Prediction>,
    scorer: String,
}

impl ScoredDataset {
    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn numeric_columns(&self) -> &[String] {
        &self.numeric_columns
    }

    pub fn params(&self) -> &AnalysisParams {
        &self.params
    }

    pub fn scorer(&self) -> &str {
        &self.scorer
    }

    pub fn predictions(&self) -> &[Prediction] {
        &self.predictions
    }

    pub fn labels(&self) -> impl Iterator<Item = Label> + '_ {
        self.predictions.iter().map(|p| Label::from(*p))
    }

    pub fn suspicious_count(&self) -> usize {
        self.labels().filter(|l| *l == Label::Suspicious).count()
    }

    pub fn outcome(&self) -> ResultsOutcome {
        match self.suspicious_count() {
            0 => ResultsOutcome::NoAnomalies,
            count => ResultsOutcome::Anomalies { count },
        }
    }

    /// Original columns followed by the two derived columns.
    pub fn scored_columns(&self) -> Vec<String> {
        let mut columns = self.dataset.column_names();
        columns.push(SCORE_COLUMN.to_string());
        columns.push(STATUS_COLUMN.to_string());
        columns
    }

    /// Formatted cells of row `idx`, derived columns included.
    pub fn scored_row(&self, idx: usize) -> Vec<String> {
        let prediction = self.predictions[idx];
        let mut cells: Vec<String> = self.dataset.rows()[idx].iter().map(Value::to_string).collect();
        cells.push(prediction.raw().to_string());
        cells.push(Label::from(prediction).to_string());
        cells
    }

    /// Rows labelled Suspicious, formatted exactly as displayed and exported.
    pub fn anomalies(&self) -> AnomalyTable {
        let rows = self
            .labels()
            .enumerate()
            .filter(|(_, label)| *label == Label::Suspicious)
            .map(|(idx, _)| self.scored_row(idx))
            .collect();
        AnomalyTable::new(self.scored_columns(), rows)
    }
}

/// Run the whole pipeline on an uploaded file.
pub fn run(bytes: &[u8], request: &ParamRequest, scorer: &dyn Scorer) -> Result<RunResult, PipelineError> {
    let dataset = ingest::parse_csv(bytes)?;
    run_dataset(dataset, request, scorer)
}

/// Run validation and scoring on an already parsed dataset.
pub fn run_dataset(
    dataset: Dataset,
    request: &ParamRequest,
    scorer: &dyn Scorer,
) -> Result<RunResult, PipelineError> {
    let numeric_columns = match ingest::validate(&dataset) {
        Ok(cols) => cols,
        Err(reason) => return Ok(RunResult::ValidationFailed { dataset, reason }),
    };
    let params = match AnalysisParams::resolve(request, &numeric_columns) {
        Ok(p) => p,
        Err(reason) => {
            warn!(%reason, "rejected analysis parameters");
            return Ok(RunResult::ValidationFailed { dataset, reason });
        }
    };

    let points = feature_points(&dataset, &params)?;
    let predictions = scorer.score(&points, params.contamination, DEFAULT_SEED)?;

    let scored = ScoredDataset {
        dataset,
        numeric_columns,
        params,
        predictions,
        scorer: scorer.name().to_string(),
    };
    info!(
        scorer = %scored.scorer,
        rows = scored.dataset.len(),
        feature_x = %scored.params.feature_x,
        feature_y = %scored.params.feature_y,
        contamination = scored.params.contamination,
        suspicious = scored.suspicious_count(),
        "scoring finished"
    );
    Ok(RunResult::Scored(scored))
}

/// Pull the two selected features out of the dataset as points.
pub fn feature_points(dataset: &Dataset, params: &AnalysisParams) -> Result<Vec<(f64, f64)>, ScoringError> {
    let xs = numeric_column(dataset, &params.feature_x)?;
    let ys = numeric_column(dataset, &params.feature_y)?;
    Ok(xs.into_iter().zip(ys).collect())
}

fn numeric_column(dataset: &Dataset, name: &str) -> Result<Vec<f64>, ScoringError> {
    let idx = dataset
        .column_index(name)
        .ok_or_else(|| ScoringError::UnknownColumn(name.to_string()))?;

    dataset
        .rows()
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let row_no = i + 1;
            match &row[idx] {
                Value::Integer(v) => Ok(*v as f64),
                Value::Float(v) if v.is_finite() => Ok(*v),
                Value::Float(_) => Err(ScoringError::NonFinite {
                    column: name.to_string(),
                    row: row_no,
                }),
                Value::Missing => Err(ScoringError::MissingValue {
                    column: name.to_string(),
                    row: row_no,
                }),
                Value::Text(s) => Err(ScoringError::NonNumeric {
                    column: name.to_string(),
                    row: row_no,
                    value: s.clone(),
                }),
            }
        })
        .collect()
}

/// Serializable summary of a run, used by the JSON API and the CLI.
#[derive(Debug, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunReport {
    Error {
        message: String,
    },
    ValidationFailed {
        message: String,
        columns: Vec<String>,
    },
    ScoredEmpty {
        params: AnalysisParams,
        row_count: usize,
        numeric_columns: Vec<String>,
        message: String,
    },
    ScoredWithAnomalies {
        params: AnalysisParams,
        row_count: usize,
        numeric_columns: Vec<String>,
        anomaly_count: usize,
        anomalies: AnomalyTable,
    },
}

/// Message shown when a run is halted by a parse or scoring error.
pub fn error_message(err: &PipelineError) -> String {
    format!("An error occurred while processing the file: {}", err)
}

pub const NO_ANOMALIES_MESSAGE: &str = "No anomalies detected with current settings.";

impl RunReport {
    pub fn from_outcome(outcome: &Result<RunResult, PipelineError>) -> Self {
        match outcome {
            Err(err) => RunReport::Error {
                message: error_message(err),
            },
            Ok(RunResult::ValidationFailed { dataset, reason }) => RunReport::ValidationFailed {
                message: reason.to_string(),
                columns: dataset.column_names(),
            },
            Ok(RunResult::Scored(scored)) => match scored.outcome() {
                ResultsOutcome::NoAnomalies => RunReport::ScoredEmpty {
                    params: scored.params().clone(),
                    row_count: scored.dataset().len(),
                    numeric_columns: scored.numeric_columns().to_vec(),
                    message: NO_ANOMALIES_MESSAGE.to_string(),
                },
                ResultsOutcome::Anomalies { count } => RunReport::ScoredWithAnomalies {
                    params: scored.params().clone(),
                    row_count: scored.dataset().len(),
                    numeric_columns: scored.numeric_columns().to_vec(),
                    anomaly_count: count,
                    anomalies: scored.anomalies(),
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::IsolationForest;

    const SAMPLE: &[u8] = b"id,amount,hour,merchant\n\
1,10.0,12,a\n2,11.5,13,b\n3,9.8,12,c\n4,10.2,11,a\n5,10.9,12,b\n\
6,9.5,13,c\n7,10.4,12,a\n8,11.1,11,b\n9,10.0,12,c\n10,950.0,3,z\n";

    fn request(x: &str, y: &str, c: f64) -> ParamRequest {
        ParamRequest {
            feature_x: Some(x.to_string()),
            feature_y: Some(y.to_string()),
            contamination: Some(c),
        }
    }

    #[test]
    fn test_defaults_use_first_two_numeric_columns() {
        let outcome = run(SAMPLE, &ParamRequest::default(), &IsolationForest::new()).unwrap();
        let RunResult::Scored(scored) = outcome else {
            panic!("expected a scored run");
        };
        assert_eq!(scored.params().feature_x, "id");
        assert_eq!(scored.params().feature_y, "amount");
        assert_eq!(scored.params().contamination, CONTAMINATION_DEFAULT);
        assert_eq!(scored.predictions().len(), 10);
    }

    #[test]
    fn test_extreme_row_is_the_only_anomaly() {
        let outcome = run(SAMPLE, &request("amount", "hour", 0.1), &IsolationForest::new()).unwrap();
        let RunResult::Scored(scored) = outcome else {
            panic!("expected a scored run");
        };
        assert_eq!(scored.outcome(), ResultsOutcome::Anomalies { count: 1 });
        let table = scored.anomalies();
        assert_eq!(table.rows().len(), 1);
        assert_eq!(table.rows()[0][0], "10");
        assert_eq!(table.rows()[0][1], "950.0");
        assert_eq!(table.rows()[0][4], "-1");
        assert_eq!(table.rows()[0][5], "Suspicious");
        assert_eq!(
            table.columns(),
            ["id", "amount", "hour", "merchant", "anomaly_score", "Status"]
        );
    }

    #[test]
    fn test_text_feature_is_a_scoring_error() {
        let err = run(SAMPLE, &request("amount", "merchant", 0.05), &IsolationForest::new()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Scoring(ScoringError::NonNumeric { ref column, row: 1, .. }) if column == "merchant"
        ));
        assert!(error_message(&err).starts_with("An error occurred while processing the file:"));
    }

    #[test]
    fn test_missing_value_is_a_scoring_error() {
        let csv = b"a,b\n1,2\n3,\n5,6\n";
        let err = run(csv, &ParamRequest::default(), &IsolationForest::new()).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Scoring(ScoringError::MissingValue { row: 2, .. })
        ));
    }

    #[test]
    fn test_unknown_feature() {
        let err = run(SAMPLE, &request("amount", "nope", 0.05), &IsolationForest::new()).unwrap_err();
        assert!(matches!(err, PipelineError::Scoring(ScoringError::UnknownColumn(_))));
    }

    #[test]
    fn test_contamination_out_of_range_fails_validation() {
        let outcome = run(SAMPLE, &request("amount", "hour", 0.5), &IsolationForest::new()).unwrap();
        assert!(matches!(
            outcome,
            RunResult::ValidationFailed {
                reason: ValidationError::ContaminationOutOfRange { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_header_only_file_is_a_scoring_error() {
        let err = run(b"a,b\n", &ParamRequest::default(), &IsolationForest::new()).unwrap_err();
        assert!(matches!(err, PipelineError::Scoring(ScoringError::EmptyInput)));
    }

    #[test]
    fn test_report_states() {
        let scored = run(SAMPLE, &request("amount", "hour", 0.1), &IsolationForest::new());
        let report = serde_json::to_value(RunReport::from_outcome(&scored)).unwrap();
        assert_eq!(report["state"], "scored_with_anomalies");
        assert_eq!(report["anomaly_count"], 1);

        let invalid = run(b"name,v\nx,1\n", &ParamRequest::default(), &IsolationForest::new());
        let report = serde_json::to_value(RunReport::from_outcome(&invalid)).unwrap();
        assert_eq!(report["state"], "validation_failed");

        let broken = run(b"", &ParamRequest::default(), &IsolationForest::new());
        let report = serde_json::to_value(RunReport::from_outcome(&broken)).unwrap();
        assert_eq!(report["state"], "error");
    }
}

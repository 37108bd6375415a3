use crate::error::{ErrorCode, PipelineError, Result};
use crate::results::{InputSource, RequestParams};

/// Request fields as they arrive from the transport, before validation
#[derive(Debug, Clone, Default)]
pub struct RawAnalysisRequest {
    /// `(original filename, bytes)` of an uploaded input table
    pub upload: Option<(String, Vec<u8>)>,
    /// Name of a predefined dataset
    pub dataset: Option<String>,
    pub alpha: Option<String>,
    pub clusters: Option<String>,
}

/// A request that passed validation
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub source: InputSource,
    pub alpha: f64,
    pub clusters: i64,
    /// Parameters as supplied, passed to the worker and stored verbatim
    pub params: RequestParams,
}

impl AnalysisRequest {
    /// Validate a raw request. Runs before any identifier is issued.
    pub fn parse(raw: RawAnalysisRequest) -> Result<Self> {
        let alpha_raw = non_empty(raw.alpha);
        let clusters_raw = non_empty(raw.clusters);
        let (Some(alpha_raw), Some(clusters_raw)) = (alpha_raw, clusters_raw) else {
            return Err(PipelineError::validation(
                ErrorCode::VALIDATION_REQUIRED_FIELD,
                "alpha,clusters",
                "Missing required parameters: alpha and clusters.",
            ));
        };

        let alpha = alpha_raw
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|a| a.is_finite())
            .ok_or_else(|| invalid_number("alpha"))?;
        let clusters = clusters_raw
            .trim()
            .parse::<i64>()
            .map_err(|_| invalid_number("clusters"))?;

        let source = match (raw.upload, non_empty(raw.dataset)) {
            (Some((filename, bytes)), None) => InputSource::Upload { filename, bytes },
            (None, Some(name)) => InputSource::Dataset { name },
            (None, None) => {
                return Err(PipelineError::validation(
                    ErrorCode::VALIDATION_INPUT_SOURCE,
                    "file",
                    "No file provided.",
                ))
            }
            (Some(_), Some(_)) => {
                return Err(PipelineError::validation(
                    ErrorCode::VALIDATION_INPUT_SOURCE,
                    "file",
                    "Provide either an uploaded file or a dataset name, not both.",
                ))
            }
        };

        Ok(Self {
            source,
            alpha,
            clusters,
            params: RequestParams {
                alpha: alpha_raw,
                clusters: clusters_raw,
            },
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn invalid_number(field: &str) -> PipelineError {
    PipelineError::validation(
        ErrorCode::VALIDATION_INVALID_NUMBER,
        field,
        "Invalid alpha or clusters value.",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(alpha: &str, clusters: &str) -> RawAnalysisRequest {
        RawAnalysisRequest {
            upload: None,
            dataset: Some("sampleA".to_string()),
            alpha: Some(alpha.to_string()),
            clusters: Some(clusters.to_string()),
        }
    }

    fn code(raw: RawAnalysisRequest) -> u16 {
        AnalysisRequest::parse(raw).unwrap_err().code()
    }

    #[test]
    fn test_valid_request_keeps_raw_params() {
        let request = AnalysisRequest::parse(raw("0.5", "3")).unwrap();
        assert_eq!(request.alpha, 0.5);
        assert_eq!(request.clusters, 3);
        assert_eq!(request.params.alpha, "0.5");
        assert_eq!(request.params.clusters, "3");
        assert!(matches!(request.source, InputSource::Dataset { ref name } if name == "sampleA"));
    }

    #[test]
    fn test_missing_parameters() {
        let mut request = raw("0.5", "3");
        request.alpha = None;
        assert_eq!(code(request), ErrorCode::VALIDATION_REQUIRED_FIELD);
        assert_eq!(code(raw("0.5", " ")), ErrorCode::VALIDATION_REQUIRED_FIELD);
    }

    #[test]
    fn test_non_numeric_parameters() {
        assert_eq!(code(raw("abc", "3")), ErrorCode::VALIDATION_INVALID_NUMBER);
        assert_eq!(code(raw("NaN", "3")), ErrorCode::VALIDATION_INVALID_NUMBER);
        assert_eq!(code(raw("inf", "3")), ErrorCode::VALIDATION_INVALID_NUMBER);
        assert_eq!(code(raw("0.5", "3.5")), ErrorCode::VALIDATION_INVALID_NUMBER);
        assert_eq!(code(raw("0.5", "three")), ErrorCode::VALIDATION_INVALID_NUMBER);
    }

    #[test]
    fn test_exactly_one_source() {
        let mut neither = raw("0.5", "3");
        neither.dataset = None;
        assert_eq!(code(neither), ErrorCode::VALIDATION_INPUT_SOURCE);

        let mut both = raw("0.5", "3");
        both.upload = Some(("in.txt".to_string(), b"x".to_vec()));
        assert_eq!(code(both), ErrorCode::VALIDATION_INPUT_SOURCE);

        let mut upload = raw("0.5", "3");
        upload.dataset = Some(String::new());
        upload.upload = Some(("in.txt".to_string(), b"x".to_vec()));
        let request = AnalysisRequest::parse(upload).unwrap();
        assert!(matches!(request.source, InputSource::Upload { .. }));
    }
}

use codegate_core::AppError;

/// Upload validation errors. All of them are the uploader's fault and are raised
/// before anything is stored or enqueued.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("File too large: {size} bytes (max: {max} bytes)")]
    FileTooLarge { size: u64, max: u64 },

    #[error("Invalid content type: {content_type} (allowed: {allowed:?})")]
    InvalidContentType {
        content_type: String,
        allowed: Vec<String>,
    },

    #[error("Invalid {field}: {value:?}")]
    InvalidName { field: &'static str, value: String },
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        match err {
            ValidationError::FileTooLarge { .. } => AppError::PayloadTooLarge(err.to_string()),
            ValidationError::InvalidContentType { content_type, .. } => {
                AppError::UnsupportedContentType(content_type)
            }
            ValidationError::InvalidName { .. } => AppError::InvalidInput(err.to_string()),
        }
    }
}

/// Upload validator
///
/// Checks the declared size, the declared content type and the path components
/// of an upload without touching storage.
#[derive(Debug, Clone)]
pub struct UploadValidator {
    max_upload_size: u64,
    allowed_content_types: Vec<String>,
}

impl UploadValidator {
    pub fn new(max_upload_size: u64, allowed_content_types: Vec<String>) -> Self {
        Self {
            max_upload_size,
            allowed_content_types: allowed_content_types
                .into_iter()
                .map(|ct| ct.trim().to_lowercase())
                .collect(),
        }
    }

    /// Validate the declared (as-transmitted) size
    pub fn validate_size(&self, declared: u64) -> Result<(), ValidationError> {
        if declared > self.max_upload_size {
            return Err(ValidationError::FileTooLarge {
                size: declared,
                max: self.max_upload_size,
            });
        }
        Ok(())
    }

    /// Validate content type against the allow-list, ignoring parameters and case
    pub fn validate_content_type(&self, content_type: &str) -> Result<(), ValidationError> {
        let media_type = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_lowercase();

        if !self.allowed_content_types.iter().any(|ct| ct == &media_type) {
            return Err(ValidationError::InvalidContentType {
                content_type: content_type.to_string(),
                allowed: self.allowed_content_types.clone(),
            });
        }
        Ok(())
    }

    /// Names become storage path segments, so they must be single, non-empty segments.
    pub fn validate_name(&self, field: &'static str, value: &str) -> Result<(), ValidationError> {
        let invalid = value.trim().is_empty()
            || value.contains('/')
            || value.contains('\\')
            || value.contains("..")
            || value.chars().any(char::is_control);
        // A leading dot on organisation would reach the store's reserved attribute area.
        let hidden = field == "organisation" && value.starts_with('.');

        if invalid || hidden {
            return Err(ValidationError::InvalidName {
                field,
                value: value.to_string(),
            });
        }
        Ok(())
    }

    pub fn validate_all(
        &self,
        organisation: &str,
        project: &str,
        file_name: &str,
        content_type: &str,
        declared_size: u64,
    ) -> Result<(), ValidationError> {
        self.validate_size(declared_size)?;
        self.validate_content_type(content_type)?;
        self.validate_name("organisation", organisation)?;
        self.validate_name("project", project)?;
        self.validate_name("file name", file_name)?;
        Ok(())
    }
}

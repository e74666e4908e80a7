use crate::state::ItemStage;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Error types for the ingestion pipeline
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("Feed unavailable: {0}")]
    FeedUnavailable(String),

    #[error("Transfer failed: {0}")]
    Transfer(String),

    #[error("Transcode failed: {0}")]
    Transcode(String),

    #[error("Feed write failed: {0}")]
    FeedWrite(String),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Item {activity_id} failed while {stage}: {source}")]
    Stage {
        activity_id: String,
        stage: ItemStage,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Wrap an error with the item and the stage it was heading into
    pub fn at_stage(self, activity_id: &str, stage: ItemStage) -> Self {
        PipelineError::Stage {
            activity_id: activity_id.to_string(),
            stage,
            source: Box::new(self),
        }
    }

    /// Innermost error, unwrapping any stage context
    pub fn root(&self) -> &PipelineError {
        match self {
            PipelineError::Stage { source, .. } => source.root(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_context_in_message() {
        let err = PipelineError::Transcode("ffmpeg exited with 1".to_string())
            .at_stage("548470", ItemStage::Transcoded);

        let message = err.to_string();
        assert!(message.contains("548470"));
        assert!(message.contains("transcoding"));
        assert!(matches!(err.root(), PipelineError::Transcode(_)));
    }
}

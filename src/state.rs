use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::debug;

/// Processing stages a single source item moves through
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ItemStage {
    /// Item read from the source feed
    Discovered,

    /// Redirect followed to the concrete media URL
    Resolved,

    /// Video downloaded to the scratch directory
    Fetched,

    /// Audio track extracted and encoded
    Transcoded,

    /// Audio object uploaded to the bucket
    Published,

    /// Episode appended to the output feed and the feed re-uploaded
    Registered,

    /// Downloaded video removed
    CleanedUp,

    /// Transcript produced and uploaded (optional)
    Transcribed,
}

impl ItemStage {
    /// Stage that follows this one on the success path
    pub fn next(self) -> Option<ItemStage> {
        use ItemStage::*;
        match self {
            Discovered => Some(Resolved),
            Resolved => Some(Fetched),
            Fetched => Some(Transcoded),
            Transcoded => Some(Published),
            Published => Some(Registered),
            Registered => Some(CleanedUp),
            CleanedUp => Some(Transcribed),
            Transcribed => None,
        }
    }
}

impl fmt::Display for ItemStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Describes the work done to reach the stage
        let label = match self {
            ItemStage::Discovered => "discovering",
            ItemStage::Resolved => "resolving",
            ItemStage::Fetched => "fetching",
            ItemStage::Transcoded => "transcoding",
            ItemStage::Published => "publishing",
            ItemStage::Registered => "registering",
            ItemStage::CleanedUp => "cleaning up",
            ItemStage::Transcribed => "transcribing",
        };
        f.write_str(label)
    }
}

/// Terminal state of one source item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Recording withdrawn upstream; iteration continues
    Skipped { activity_id: String, resolved_url: String },

    /// Already published; the whole run ends here
    Stopped { activity_id: String },

    /// Episode published (and transcribed when enabled)
    Completed {
        activity_id: String,
        audio_key: String,
        transcript_id: Option<String>,
    },
}

/// Tracks the stages completed by the item currently in flight
#[derive(Debug, Clone)]
pub struct ItemProgress {
    activity_id: String,
    current: ItemStage,
    completed: Vec<ItemStage>,
    started: Instant,
    stage_started: Instant,
    stage_times: Vec<(ItemStage, Duration)>,
}

impl ItemProgress {
    pub fn new(activity_id: &str) -> Self {
        let now = Instant::now();
        Self {
            activity_id: activity_id.to_string(),
            current: ItemStage::Discovered,
            completed: vec![ItemStage::Discovered],
            started: now,
            stage_started: now,
            stage_times: Vec::new(),
        }
    }

    pub fn activity_id(&self) -> &str {
        &self.activity_id
    }

    /// Stage most recently reached
    pub fn current(&self) -> ItemStage {
        self.current
    }

    /// Stage the item is heading into, used as error context
    pub fn pending(&self) -> ItemStage {
        self.current.next().unwrap_or(self.current)
    }

    pub fn completed(&self) -> &[ItemStage] {
        &self.completed
    }

    /// Record that `stage` has been reached
    pub fn advance(&mut self, stage: ItemStage) {
        debug_assert!(stage > self.current, "stages only move forward");

        let elapsed = self.stage_started.elapsed();
        debug!(
            "{} reached {:?} after {:.1}s",
            self.activity_id,
            stage,
            elapsed.as_secs_f64()
        );

        self.stage_times.push((stage, elapsed));
        self.completed.push(stage);
        self.current = stage;
        self.stage_started = Instant::now();
    }

    pub fn stage_times(&self) -> &[(ItemStage, Duration)] {
        &self.stage_times
    }

    pub fn total_time(&self) -> Duration {
        self.started.elapsed()
    }
}

/// What a single run did, newest item first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Activity ids of newly published episodes
    pub published: Vec<String>,

    /// Activity ids skipped as unavailable
    pub skipped: Vec<String>,

    /// Activity id that triggered the novelty stop, if any
    pub stopped_at: Option<String>,

    /// Transcript ids produced during the run
    pub transcripts: Vec<String>,
}

impl RunSummary {
    pub fn record(&mut self, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Skipped { activity_id, .. } => self.skipped.push(activity_id),
            ItemOutcome::Stopped { activity_id } => self.stopped_at = Some(activity_id),
            ItemOutcome::Completed {
                activity_id,
                transcript_id,
                ..
            } => {
                self.published.push(activity_id);
                if let Some(id) = transcript_id {
                    self.transcripts.push(id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_order_follows_pipeline() {
        let mut stage = ItemStage::Discovered;
        let mut visited = vec![stage];
        while let Some(next) = stage.next() {
            assert!(next > stage);
            visited.push(next);
            stage = next;
        }
        assert_eq!(visited.len(), 8);
        assert_eq!(visited.last(), Some(&ItemStage::Transcribed));
    }

    #[test]
    fn test_progress_tracks_pending_stage() {
        let mut progress = ItemProgress::new("548470");
        assert_eq!(progress.pending(), ItemStage::Resolved);

        progress.advance(ItemStage::Resolved);
        progress.advance(ItemStage::Fetched);
        assert_eq!(progress.current(), ItemStage::Fetched);
        assert_eq!(progress.pending(), ItemStage::Transcoded);
        assert_eq!(progress.completed().len(), 3);
        assert_eq!(progress.stage_times().len(), 2);
    }

    #[test]
    fn test_summary_records_outcomes() {
        let mut summary = RunSummary::default();
        summary.record(ItemOutcome::Completed {
            activity_id: "3".to_string(),
            audio_key: "1_3.mp3".to_string(),
            transcript_id: Some("1_3".to_string()),
        });
        summary.record(ItemOutcome::Skipped {
            activity_id: "2".to_string(),
            resolved_url: "https://x/not-available".to_string(),
        });
        summary.record(ItemOutcome::Stopped {
            activity_id: "1".to_string(),
        });

        assert_eq!(summary.published, vec!["3"]);
        assert_eq!(summary.skipped, vec!["2"]);
        assert_eq!(summary.stopped_at.as_deref(), Some("1"));
        assert_eq!(summary.transcripts, vec!["1_3"]);
    }
}

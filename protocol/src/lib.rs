pub mod account;
pub mod analysis;
pub mod report;
pub mod state;

// Re-export the types most callers touch at the crate root.
pub use account::Session;
pub use account::UserProfile;
pub use analysis::AnalysisRequest;
pub use analysis::AnalysisResult;
pub use analysis::IndustryRanking;
pub use analysis::ModelVisibility;
pub use analysis::OptimizationCategory;
pub use analysis::SentimentEntry;
pub use analysis::VisibilityBreakdown;
pub use state::AnalysisEvent;
pub use state::AnalysisSnapshot;
pub use state::FailureKind;
pub use state::SyncFailure;
pub use state::SyncStatus;

//! ISOBAR forecast date search.
//!
//! Holds the session-level forecast base date and searches for the
//! nearest base date with usable forecast content.

pub mod probe;
pub mod session;

pub use probe::{
    availability_endpoint, summary_endpoint, AggregateSummary, Availability, ForecastApi,
    ForecastProbe, LeadSeries, SummaryBaseline,
};
pub use session::{
    DateContext, DateSession, SearchCandidate, SearchOutcome, SearchSettings, SearchState,
};

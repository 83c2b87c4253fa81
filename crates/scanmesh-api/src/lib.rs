//! Orchestrator HTTP ingress, Query Service, and the shared request/response
//! shaping used by both.

pub mod health;
pub mod orchestrator;
pub mod query_service;
pub mod querybuilder;
pub mod queryparse;
pub mod search;

pub use health::{aggregate_health, HealthProbes};
pub use orchestrator::{get_health, post_scan, OrchestratorState, ScanPostRequest};
pub use query_service::{get_scans, parse_query_string, QueryState};
pub use querybuilder::{build_search_request, parse_query_params, QueryParams};
pub use search::{ElasticSearcher, IndexSearcher, SearchError};

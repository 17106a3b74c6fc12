// Configuration loading and validation
pub mod config;

// Remote profile/presence service client
pub mod remote;

// Snapshots and structural diffing
pub mod snapshot;

// Persisted state load/save
pub mod store;

// Bounded retry with exponential backoff
pub mod retry;

// Webhook change reports
pub mod notify;

// Poll scheduler and notification gate
pub mod tracker;

pub mod api;
pub mod config;
pub mod controller;
pub mod humanize;
pub mod ingress;
pub mod ledger;
pub mod observability;
pub mod queue;
pub mod routing;
pub mod storage;
pub mod transport;
pub mod worker;

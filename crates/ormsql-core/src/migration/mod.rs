//! Schema reconciliation.
//!
//! Compares the registry against the live store through the dialect's
//! [`SchemaChecker`](crate::dialect::SchemaChecker) and applies additive
//! changes only. Nothing is ever dropped or altered in place.

mod ddl;
mod diff;
mod reconcile;

pub use diff::{LiveTable, SchemaChange};
pub use reconcile::{ReconcileReport, SchemaReconciler};

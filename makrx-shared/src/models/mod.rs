/// Database models
///
/// Each model owns its SQL: a row struct deriving `sqlx::FromRow`, input
/// structs for create/update, and `impl` blocks with async query functions.
///
/// - `makerspace`: makerspaces and memberships (MakrCave tenants)
/// - `inventory`: stock items and usage log
/// - `equipment`: machines and reservations
/// - `project`: projects and collaborators
/// - `notification`: per-user notifications
/// - `event`: events, microsites, registrations, teams, tournaments, sponsors
/// - `feature_flag`: feature flag rows
/// - `provider`: fabrication service providers
/// - `service_order`: service orders, their event log and job assignments
/// - `product`, `cart`, `store_order`: store catalog, carts and orders

pub mod cart;
pub mod equipment;
pub mod event;
pub mod feature_flag;
pub mod inventory;
pub mod makerspace;
pub mod notification;
pub mod product;
pub mod project;
pub mod provider;
pub mod service_order;
pub mod store_order;

/// API route handlers
///
/// Organized by product area:
///
/// - `health`: liveness and readiness
/// - `makerspaces`, `inventory`, `equipment`, `projects`, `notifications`: MakrCave
/// - `events`: MakrX Events (microsites, events, teams, tournaments, sponsors)
/// - `features`: feature flag evaluation and admin upserts
/// - `services`, `providers`, `dispatch`: service marketplace
/// - `products`, `cart`, `orders`: MakrX Store
/// - `integrations`: service-to-store status sync

pub mod cart;
pub mod dispatch;
pub mod equipment;
pub mod events;
pub mod features;
pub mod health;
pub mod integrations;
pub mod inventory;
pub mod makerspaces;
pub mod notifications;
pub mod orders;
pub mod products;
pub mod projects;
pub mod providers;
pub mod services;

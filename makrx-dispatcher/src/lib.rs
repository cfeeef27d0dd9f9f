//! # MakrX Dispatcher
//!
//! Background worker that matches pending service orders to providers.
//!
//! ## Modules
//!
//! - `config`: environment configuration
//! - `queue`: due-order reader
//! - `orchestrator`: the poll loop (expire stale offers, then dispatch)
//!
//! ## Example
//!
//! ```no_run
//! use makrx_dispatcher::config::DispatcherConfig;
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = DispatcherConfig::from_env()?;
//! println!("Polling every {:?}", config.poll_interval());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod orchestrator;
pub mod queue;

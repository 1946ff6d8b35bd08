pub mod error;
pub mod models;
pub mod state_machine;
pub mod database;
pub mod chain;
pub mod vault_manager;
pub mod scheduler;
pub mod deployment_monitor;
pub mod recovery_monitor;
pub mod config;
pub mod telemetry;
pub mod api;
pub mod service;

pub use error::{VaultError, Result};
pub use models::*;
pub use state_machine::can_transition;
pub use vault_manager::{Transition, VaultManager};
pub use deployment_monitor::DeploymentMonitor;
pub use recovery_monitor::{RecoveryMonitor, DivergedRecovery};
pub use scheduler::{PollingJob, PollingTask, TickReport};
pub use config::{Config, MonitorConfig};
pub use database::{VaultStore, WalletResolver, VaultRepository, WalletRepository};
pub use chain::{ContractFactory, ContractResolver, SmartContract, WalletFactory, SigningWallet};
pub use service::VaultService;

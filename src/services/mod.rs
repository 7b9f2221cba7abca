//! Business logic services layer

pub mod audit_service;
pub mod entitlement_service;
pub mod license_service;
pub mod session_service;
pub mod sweeper;

pub use audit_service::AuditService;
pub use entitlement_service::EntitlementService;
pub use license_service::LicenseService;
pub use session_service::SessionService;
pub use sweeper::HeartbeatMonitor;

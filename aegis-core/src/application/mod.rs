pub mod rbac_bootstrap;
pub mod unit_of_work;

pub use rbac_bootstrap::RbacBootstrapService;
pub use unit_of_work::AuthUnitOfWork;

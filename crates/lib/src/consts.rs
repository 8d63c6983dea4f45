/// Application name, used for data directories and the `ManagedBy` tag.
pub const APP_NAME: &str = "scopedeploy";

/// Confirmation token required to destroy base-scoped resources.
pub const DESTROY_BASE_TOKEN: &str = "destroy-base";

/// Overrides the directory holding the scope state partitions.
pub const STATE_DIR_ENV: &str = "SCOPEDEPLOY_STATE_DIR";

/// Overrides the directory holding the local provider's inventory.
pub const INVENTORY_DIR_ENV: &str = "SCOPEDEPLOY_INVENTORY_DIR";

/// Standard tag keys stamped onto every created resource.
pub mod tags {
  pub const ENVIRONMENT: &str = "Environment";
  pub const SCOPE: &str = "Scope";
  pub const MANAGED_BY: &str = "ManagedBy";
  pub const SPEC_ID: &str = "SpecId";
}

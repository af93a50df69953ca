use std::{fmt, sync::Arc};

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::{
    database::ports::roles::RolesRepository,
    domain::users::rbac::{Permission, Role, permissions, roles},
    error::Result,
};

/// Fixed id of the owner role. The single-owner index in the schema keys
/// on this value.
pub const OWNER_ROLE_ID: Uuid = Uuid::from_u128(1);
pub const ADMIN_ROLE_ID: Uuid = Uuid::from_u128(2);
pub const DOCTOR_ROLE_ID: Uuid = Uuid::from_u128(3);
pub const STAFF_ROLE_ID: Uuid = Uuid::from_u128(4);
pub const PATIENT_ROLE_ID: Uuid = Uuid::from_u128(5);

struct RoleSeed {
    id: Uuid,
    code: &'static str,
    name: &'static str,
    description: &'static str,
    level: i32,
    can_self_register: bool,
}

const ROLE_SEEDS: [RoleSeed; 5] = [
    RoleSeed {
        id: OWNER_ROLE_ID,
        code: roles::OWNER,
        name: "Owner",
        description: "Clinic owner with every permission",
        level: 100,
        can_self_register: true,
    },
    RoleSeed {
        id: ADMIN_ROLE_ID,
        code: roles::ADMIN,
        name: "Administrator",
        description: "Manages user accounts",
        level: 80,
        can_self_register: false,
    },
    RoleSeed {
        id: DOCTOR_ROLE_ID,
        code: roles::DOCTOR,
        name: "Doctor",
        description: "Medical staff with read access to users",
        level: 60,
        can_self_register: false,
    },
    RoleSeed {
        id: STAFF_ROLE_ID,
        code: roles::STAFF,
        name: "Staff",
        description: "Front desk staff",
        level: 40,
        can_self_register: false,
    },
    RoleSeed {
        id: PATIENT_ROLE_ID,
        code: roles::PATIENT,
        name: "Patient",
        description: "Self-registered patient",
        level: 10,
        can_self_register: true,
    },
];

const PERMISSION_SEEDS: [(u128, (&str, &str)); 8] = [
    (101, permissions::USER_READ),
    (102, permissions::USER_CREATE),
    (103, permissions::USER_UPDATE),
    (104, permissions::USER_DELETE),
    (105, permissions::ROLE_READ),
    (106, permissions::ROLE_MANAGE),
    (107, permissions::PROFILE_READ),
    (108, permissions::PROFILE_UPDATE),
];

fn grants_for(code: &str) -> Vec<(&'static str, &'static str)> {
    use permissions::*;
    match code {
        roles::OWNER => PERMISSION_SEEDS.iter().map(|(_, pair)| *pair).collect(),
        roles::ADMIN => vec![
            USER_READ,
            USER_CREATE,
            USER_UPDATE,
            USER_DELETE,
            ROLE_READ,
            PROFILE_READ,
            PROFILE_UPDATE,
        ],
        roles::DOCTOR | roles::STAFF => {
            vec![USER_READ, PROFILE_READ, PROFILE_UPDATE]
        }
        roles::PATIENT => vec![PROFILE_READ, PROFILE_UPDATE],
        _ => Vec::new(),
    }
}

/// Seeds the fixed roles, permissions and grants. Safe to run on every
/// start.
pub struct RbacBootstrapService {
    repo: Arc<dyn RolesRepository>,
}

impl fmt::Debug for RbacBootstrapService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RbacBootstrapService")
            .field("repo", &"Arc<dyn RolesRepository>")
            .finish()
    }
}

impl RbacBootstrapService {
    pub fn new(repo: Arc<dyn RolesRepository>) -> Self {
        Self { repo }
    }

    pub async fn ensure_defaults(&self) -> Result<()> {
        let now = Utc::now();
        for seed in &ROLE_SEEDS {
            self.repo
                .upsert_role(&Role {
                    id: seed.id,
                    code: seed.code.to_string(),
                    name: seed.name.to_string(),
                    description: Some(seed.description.to_string()),
                    level: seed.level,
                    can_self_register: seed.can_self_register,
                    created_at: now,
                })
                .await?;
        }

        let mut seeded = Vec::with_capacity(PERMISSION_SEEDS.len());
        for (id, (module, action)) in PERMISSION_SEEDS {
            let permission = Permission {
                id: Uuid::from_u128(id),
                module: module.to_string(),
                action: action.to_string(),
            };
            self.repo.upsert_permission(&permission).await?;
            seeded.push(permission);
        }

        let mut granted = 0usize;
        for seed in &ROLE_SEEDS {
            for (module, action) in grants_for(seed.code) {
                if let Some(permission) =
                    seeded.iter().find(|p| p.matches(module, action))
                {
                    self.repo.grant_permission(seed.id, permission.id).await?;
                    granted += 1;
                }
            }
        }

        info!(
            roles = ROLE_SEEDS.len(),
            permissions = seeded.len(),
            grants = granted,
            "ensured default roles and permissions"
        );
        Ok(())
    }
}

use derive_more::Display;

/// User id that bypasses every access check.
pub const SUPERUSER_ID: i64 = 1;

///
/// Permission
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, PartialEq)]
#[remain::sorted]
pub enum Permission {
    Read,
    Unlink,
    Write,
}

///
/// AccessOracle
///
/// Yes/no answer on field and model access for a user. Reads that are
/// refused are skipped silently; refused writes and unlinks are errors.
///

pub trait AccessOracle: Send + Sync {
    fn check_field_permission(
        &self,
        model: &str,
        field: &str,
        uid: i64,
        permission: Permission,
    ) -> bool;

    fn check_model_permission(&self, _model: &str, _uid: i64, _permission: Permission) -> bool {
        true
    }
}

///
/// AllowAll
///

#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

impl AccessOracle for AllowAll {
    fn check_field_permission(&self, _: &str, _: &str, _: i64, _: Permission) -> bool {
        true
    }
}

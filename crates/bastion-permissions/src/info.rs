use bastion_contracts::error::FieldResult;
use bastion_core::resolver::ResolveInfo;

use crate::directive::MISSING_PERMISSIONS;

/// Typed access to the `missingPermissions` side channel.
pub trait MissingPermissionsExt {
    /// Permissions found missing by RESOLVER-policy checks on this field and
    /// its arguments; `None` when nothing was missing.
    fn missing_permissions(&self) -> FieldResult<Option<Vec<String>>>;
}

impl MissingPermissionsExt for ResolveInfo {
    fn missing_permissions(&self) -> FieldResult<Option<Vec<String>>> {
        let Some(entries) = self.failures.list(MISSING_PERMISSIONS)? else {
            return Ok(None);
        };
        if entries.is_empty() {
            return Ok(None);
        }
        Ok(Some(
            entries
                .iter()
                .filter_map(|e| e.as_str().map(str::to_string))
                .collect(),
        ))
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};

/// The part an endpoint plays in the primary/replica topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
   /// The single writable endpoint.
   Primary,
   /// Read-only replica with synchronous replication.
   SyncReplica,
   /// Read-only replica with asynchronous replication.
   AsyncReplica,
}

impl Role {
   /// Order in which endpoints are tried for reads.
   pub const READ_ORDER: [Role; 3] = [Role::AsyncReplica, Role::SyncReplica, Role::Primary];

   pub fn is_primary(self) -> bool {
      matches!(self, Role::Primary)
   }

   pub fn as_str(self) -> &'static str {
      match self {
         Role::Primary => "primary",
         Role::SyncReplica => "sync replica",
         Role::AsyncReplica => "async replica",
      }
   }

   /// Roles tried for a read that starts at `self`, ending with the primary.
   pub fn read_fallback_order(self) -> &'static [Role] {
      static ORDER: [Role; 3] = Role::READ_ORDER;
      let start = ORDER
         .iter()
         .position(|role| *role == self)
         .unwrap_or(ORDER.len() - 1);
      &ORDER[start..]
   }
}

impl fmt::Display for Role {
   fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
      f.write_str(self.as_str())
   }
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn test_read_fallback_order() {
      assert_eq!(
         Role::AsyncReplica.read_fallback_order(),
         [Role::AsyncReplica, Role::SyncReplica, Role::Primary]
      );
      assert_eq!(
         Role::SyncReplica.read_fallback_order(),
         [Role::SyncReplica, Role::Primary]
      );
      assert_eq!(Role::Primary.read_fallback_order(), [Role::Primary]);
   }

   #[test]
   fn test_display_and_serde() {
      assert_eq!(Role::SyncReplica.to_string(), "sync replica");
      assert_eq!(
         serde_json::to_string(&Role::AsyncReplica).unwrap(),
         "\"async_replica\""
      );
   }
}

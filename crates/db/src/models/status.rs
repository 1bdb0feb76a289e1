//! Mapping between domain status enums and SMALLINT lookup-table ids.
//!
//! Each id matches the seed data order (1-based) in the corresponding
//! `*_statuses` table.

use browserflow_core::status::ProjectStatus;

/// Status ID type matching SMALLINT in the database.
pub type StatusId = i16;

/// A status enum persisted as a lookup-table id.
pub trait StatusIdMap: Sized + Copy {
    /// Return the database status ID.
    fn id(self) -> StatusId;

    /// Resolve a database status ID, `None` for ids outside the seed data.
    fn from_id(id: StatusId) -> Option<Self>;
}

macro_rules! map_status_ids {
    (
        $name:ident {
            $( $variant:ident = $val:literal ),+ $(,)?
        }
    ) => {
        impl StatusIdMap for $name {
            fn id(self) -> StatusId {
                match self {
                    $( $name::$variant => $val ),+
                }
            }

            fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( $val => Some($name::$variant), )+
                    _ => None,
                }
            }
        }
    };
}

map_status_ids! {
    ProjectStatus {
        Initializing = 1,
        Idle = 2,
        Running = 3,
        Blocked = 4,
    }
}

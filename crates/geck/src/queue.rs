use ash::vk;
use smallvec::SmallVec;

use crate::error::{Error, Result};

static QUEUE_PRIORITIES: [f32; 1] = [1.0];

/// Role support of one queue family of an adapter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilyInfo {
    pub index: u32,
    pub queue_count: u32,
    pub supports_graphics: bool,
    pub supports_present: bool,
}

/// Family indices chosen for each queue role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    /// Both roles are served by one family.
    pub fn shared(&self) -> bool {
        self.graphics == self.present
    }

    /// Distinct family indices, graphics first.
    pub fn unique(&self) -> SmallVec<[u32; 2]> {
        let mut unique = SmallVec::new();
        unique.push(self.graphics);
        if !self.shared() {
            unique.push(self.present);
        }
        unique
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueFamilySelection {
    Incomplete {
        graphics: Option<u32>,
        present: Option<u32>,
    },
    Resolved(QueueFamilies),
}

impl QueueFamilySelection {
    pub fn resolved(self) -> Result<QueueFamilies> {
        match self {
            QueueFamilySelection::Resolved(families) => Ok(families),
            QueueFamilySelection::Incomplete { graphics, present } => {
                Err(Error::IncompleteQueueFamilies { graphics, present })
            }
        }
    }
}

/// Picks the first family for each role independently.
pub fn select_queue_families(families: &[QueueFamilyInfo]) -> QueueFamilySelection {
    let graphics = families
        .iter()
        .find(|family| family.supports_graphics && family.queue_count > 0)
        .map(|family| family.index);

    let present = families
        .iter()
        .find(|family| family.supports_present && family.queue_count > 0)
        .map(|family| family.index);

    match (graphics, present) {
        (Some(graphics), Some(present)) => {
            QueueFamilySelection::Resolved(QueueFamilies { graphics, present })
        }
        (graphics, present) => QueueFamilySelection::Incomplete { graphics, present },
    }
}

/// One create info per distinct family, each asking for a single queue.
pub fn queue_create_infos(families: &QueueFamilies) -> Vec<vk::DeviceQueueCreateInfo> {
    families
        .unique()
        .into_iter()
        .map(|family| {
            vk::DeviceQueueCreateInfo::builder()
                .queue_family_index(family)
                .queue_priorities(&QUEUE_PRIORITIES)
                .build()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(index: u32, supports_graphics: bool, supports_present: bool) -> QueueFamilyInfo {
        QueueFamilyInfo {
            index,
            queue_count: 1,
            supports_graphics,
            supports_present,
        }
    }

    #[test]
    fn single_family_serves_both_roles() {
        let selection = select_queue_families(&[family(0, true, true)]);
        let families = selection.resolved().unwrap();
        assert_eq!(families.graphics, families.present);
        assert!(families.shared());

        let infos = queue_create_infos(&families);
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].queue_family_index, 0);
        assert_eq!(infos[0].queue_count, 1);
        assert_eq!(unsafe { *infos[0].p_queue_priorities }, 1.0);
    }

    #[test]
    fn distinct_families_get_one_entry_each() {
        let selection = select_queue_families(&[
            family(0, false, false),
            family(1, true, false),
            family(2, false, true),
        ]);
        let families = selection.resolved().unwrap();
        assert_eq!(families, QueueFamilies { graphics: 1, present: 2 });

        let infos = queue_create_infos(&families);
        let indices: Vec<u32> = infos.iter().map(|info| info.queue_family_index).collect();
        assert_eq!(indices, [1, 2]);
        for info in &infos {
            assert_eq!(unsafe { *info.p_queue_priorities }, 1.0);
        }
    }

    #[test]
    fn first_matching_family_wins() {
        let selection = select_queue_families(&[
            family(0, true, false),
            family(1, true, true),
            family(2, true, true),
        ]);
        assert_eq!(
            selection,
            QueueFamilySelection::Resolved(QueueFamilies { graphics: 0, present: 1 })
        );
    }

    #[test]
    fn missing_role_is_incomplete() {
        let selection = select_queue_families(&[family(0, true, false)]);
        assert_eq!(
            selection,
            QueueFamilySelection::Incomplete {
                graphics: Some(0),
                present: None
            }
        );

        match selection.resolved() {
            Err(Error::IncompleteQueueFamilies { graphics, present }) => {
                assert_eq!(graphics, Some(0));
                assert_eq!(present, None);
            }
            other => panic!("unexpected {other:?}"),
        }

        assert_eq!(
            select_queue_families(&[]),
            QueueFamilySelection::Incomplete {
                graphics: None,
                present: None
            }
        );
    }

    #[test]
    fn empty_family_is_skipped() {
        let mut empty = family(0, true, true);
        empty.queue_count = 0;
        let selection = select_queue_families(&[empty, family(1, true, true)]);
        assert_eq!(
            selection.resolved().unwrap(),
            QueueFamilies { graphics: 1, present: 1 }
        );
    }
}

//! Group-scoped placement and discovery.
//!
//! Each group gets a VM folder named after its tag under the datacenter's
//! base VM folder. Discovery is a two-tier lookup: the group folder first,
//! then the whole datacenter inventory. The tier is part of the result so
//! callers never mistake an inventory hit for group membership.

use crate::control_plane::ControlPlane;
use crate::error::{PluginErrorKind, PluginResult};
use crate::resolver::InventoryScope;
use crate::types::*;

use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Tag key the orchestrator uses for group membership.
pub const GROUP_TAG: &str = "infrakit.group";
/// Short alias accepted on input.
pub const GROUP_TAG_ALIAS: &str = "group";

/// The group named by `tags`, if any.
pub fn group_tag(tags: &BTreeMap<String, String>) -> Option<&str> {
    tags.get(GROUP_TAG)
        .or_else(|| tags.get(GROUP_TAG_ALIAS))
        .map(String::as_str)
        .filter(|g| !g.is_empty())
}

/// Prefix of the annotation line that records a VM's group.
pub const ANNOTATION_MARKER: &str = "infrakit.group=";

/// Annotation stored on a VM. A grouped VM gets a first line of
/// `infrakit.group=<tag>`, the user text follows unchanged.
pub fn annotate(group: Option<&str>, annotation: &str) -> String {
    match group {
        Some(g) => format!("{ANNOTATION_MARKER}{g}\n{annotation}"),
        None => annotation.to_string(),
    }
}

fn marker_line(annotation: &str) -> Option<(&str, &str)> {
    let (first, rest) = annotation.split_once('\n').unwrap_or((annotation, ""));
    let group = first.trim_end_matches('\r').strip_prefix(ANNOTATION_MARKER)?;
    Some((group.trim(), rest))
}

/// The group recorded by [`annotate`]. Annotations without the marker
/// line belong to no group.
pub fn annotation_group(annotation: &str) -> Option<&str> {
    marker_line(annotation)
        .map(|(group, _)| group)
        .filter(|g| !g.is_empty())
}

/// The user part of an annotation; a marker line is stripped.
pub fn annotation_text(annotation: &str) -> &str {
    marker_line(annotation).map_or(annotation, |(_, rest)| rest)
}

/// Where new VMs of a group are placed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupFolder {
    pub folder: ManagedRef,
    /// False when the base VM folder stands in for the group folder.
    pub scoped: bool,
}

/// Which lookup produced a [`GroupInstances`] result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchTier {
    /// VMs found inside the group's folder; members by placement.
    Group,
    /// Whole-datacenter listing; may contain VMs of other groups.
    Inventory,
}

#[derive(Debug, Clone)]
pub struct GroupInstances {
    pub tier: SearchTier,
    pub vms: Vec<VmSummary>,
}

pub struct GroupNamespace<'a, P: ?Sized> {
    plane: &'a P,
}

impl<'a, P: ControlPlane + ?Sized> GroupNamespace<'a, P> {
    pub fn new(plane: &'a P) -> Self {
        Self { plane }
    }

    /// Find or create the folder for `group`. Falls back to the base VM
    /// folder when there is no group or the control plane has no folders.
    pub async fn locate(
        &self,
        scope: &InventoryScope,
        group: Option<&str>,
    ) -> PluginResult<GroupFolder> {
        let base = GroupFolder {
            folder: scope.vm_folder.clone(),
            scoped: false,
        };
        let Some(group) = group.filter(|g| !g.is_empty()) else {
            return Ok(base);
        };

        match self.group_folder(scope, group).await {
            Ok(Some(folder)) => {
                return Ok(GroupFolder {
                    folder,
                    scoped: true,
                })
            }
            Ok(None) => {}
            Err(e) if e.is(PluginErrorKind::Unsupported) => {
                warn!(group, "folder lookup unsupported, using base VM folder");
                return Ok(base);
            }
            Err(e) => return Err(e),
        }

        match self.plane.create_folder(&scope.vm_folder.id, group).await {
            Ok(id) => {
                debug!(group, folder = %id, "group folder created");
                Ok(GroupFolder {
                    folder: ManagedRef::new(id, group),
                    scoped: true,
                })
            }
            Err(e) if e.is(PluginErrorKind::Unsupported) => {
                warn!(group, error = %e, "folder creation unsupported, using base VM folder");
                Ok(base)
            }
            Err(e) => Err(e),
        }
    }

    /// List the VMs of `group`: group folder first, whole inventory when
    /// the folder is missing, empty, or unsupported.
    pub async fn find_instances(
        &self,
        scope: &InventoryScope,
        group: Option<&str>,
    ) -> PluginResult<GroupInstances> {
        if let Some(group) = group.filter(|g| !g.is_empty()) {
            match self.group_folder(scope, group).await {
                Ok(Some(folder)) => {
                    let filter =
                        InventoryFilter::in_datacenter(&scope.datacenter.id).in_folder(&folder.id);
                    let vms = self.plane.list_vms(&filter).await?;
                    if !vms.is_empty() {
                        return Ok(GroupInstances {
                            tier: SearchTier::Group,
                            vms,
                        });
                    }
                    debug!(group, "group folder empty, searching inventory");
                }
                Ok(None) => debug!(group, "no group folder, searching inventory"),
                Err(e) if e.is(PluginErrorKind::Unsupported) => {
                    debug!(group, "folders unsupported, searching inventory")
                }
                Err(e) => return Err(e),
            }
        }

        let vms = self
            .plane
            .list_vms(&InventoryFilter::in_datacenter(&scope.datacenter.id))
            .await?;
        Ok(GroupInstances {
            tier: SearchTier::Inventory,
            vms,
        })
    }

    /// Find a VM by name anywhere in the datacenter.
    pub async fn find_by_name(
        &self,
        scope: &InventoryScope,
        name: &str,
    ) -> PluginResult<Option<VmSummary>> {
        let filter = InventoryFilter::in_datacenter(&scope.datacenter.id).named(name);
        Ok(self
            .plane
            .list_vms(&filter)
            .await?
            .into_iter()
            .find(|vm| vm.name == name))
    }

    async fn group_folder(
        &self,
        scope: &InventoryScope,
        group: &str,
    ) -> PluginResult<Option<ManagedRef>> {
        let filter = InventoryFilter::in_datacenter(&scope.datacenter.id)
            .named(group)
            .under_parent(&scope.vm_folder.id)
            .vm_folders();
        Ok(self
            .plane
            .list_folders(&filter)
            .await?
            .into_iter()
            .find(|f| f.name == group)
            .map(|f| ManagedRef::new(f.folder, f.name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_plane::MockControlPlane;
    use crate::error::PluginError;

    fn scope() -> InventoryScope {
        InventoryScope {
            datacenter: ManagedRef::new("datacenter-2", "DC1"),
            vm_folder: ManagedRef::new("group-v3", "vm"),
        }
    }

    fn vm(id: &str, name: &str) -> VmSummary {
        VmSummary {
            vm: id.into(),
            name: name.into(),
            power_state: VmPowerState::PoweredOff,
            cpu_count: None,
            memory_size_mib: None,
        }
    }

    #[test]
    fn group_tag_prefers_full_key() {
        let mut tags = BTreeMap::new();
        tags.insert(GROUP_TAG_ALIAS.to_string(), "short".to_string());
        assert_eq!(group_tag(&tags), Some("short"));
        tags.insert(GROUP_TAG.to_string(), "workers".to_string());
        assert_eq!(group_tag(&tags), Some("workers"));
        assert_eq!(group_tag(&BTreeMap::new()), None);
    }

    #[test]
    fn annotation_layout() {
        let a = annotate(Some("workers"), "built by ci\nsecond line");
        assert_eq!(annotation_group(&a), Some("workers"));
        assert_eq!(annotation_text(&a), "built by ci\nsecond line");
        assert_eq!(annotation_group(&annotate(None, "x")), None);
        assert_eq!(annotation_text(&annotate(None, "x")), "x");
    }

    #[test]
    fn foreign_annotations_have_no_group() {
        assert_eq!(annotation_group("workers"), None);
        assert_eq!(annotation_group("workers\nowned by ops"), None);
        assert_eq!(annotation_text("workers\nowned by ops"), "workers\nowned by ops");
        assert_eq!(annotation_group(""), None);
        assert_eq!(annotation_group("infrakit.group=\nx"), None);
        assert_eq!(annotation_group("infrakit.group=masters"), Some("masters"));
        assert_eq!(annotation_text("infrakit.group=masters"), "");
    }

    #[tokio::test]
    async fn existing_group_folder_is_reused() {
        let mut plane = MockControlPlane::new();
        plane
            .expect_list_folders()
            .withf(|f| f.names == vec!["workers".to_string()] && f.parent_folders == vec!["group-v3".to_string()])
            .returning(|_| {
                Ok(vec![FolderSummary {
                    folder: "group-v77".into(),
                    name: "workers".into(),
                    folder_type: Some("VIRTUAL_MACHINE".into()),
                }])
            });
        plane.expect_create_folder().never();
        let f = GroupNamespace::new(&plane).locate(&scope(), Some("workers")).await.unwrap();
        assert_eq!(f.folder.id, "group-v77");
        assert!(f.scoped);
    }

    #[tokio::test]
    async fn unsupported_folder_creation_falls_back_to_base() {
        let mut plane = MockControlPlane::new();
        plane.expect_list_folders().returning(|_| Ok(vec![]));
        plane
            .expect_create_folder()
            .returning(|_, _| Err(PluginError::unsupported("standalone host")));
        let f = GroupNamespace::new(&plane).locate(&scope(), Some("workers")).await.unwrap();
        assert_eq!(f.folder.id, "group-v3");
        assert!(!f.scoped);
    }

    #[tokio::test]
    async fn other_folder_errors_are_returned() {
        let mut plane = MockControlPlane::new();
        plane.expect_list_folders().returning(|_| Ok(vec![]));
        plane
            .expect_create_folder()
            .returning(|_, _| Err(PluginError::api(403, "denied")));
        let e = GroupNamespace::new(&plane).locate(&scope(), Some("workers")).await.unwrap_err();
        assert!(e.is(PluginErrorKind::Api(403)));
    }

    #[tokio::test]
    async fn group_tier_wins_when_folder_has_vms() {
        let mut plane = MockControlPlane::new();
        plane.expect_list_folders().returning(|_| {
            Ok(vec![FolderSummary {
                folder: "group-v77".into(),
                name: "workers".into(),
                folder_type: None,
            }])
        });
        plane
            .expect_list_vms()
            .withf(|f| f.folders == vec!["group-v77".to_string()])
            .times(1)
            .returning(|_| Ok(vec![vm("vm-1", "vm-1")]));
        let found = GroupNamespace::new(&plane)
            .find_instances(&scope(), Some("workers"))
            .await
            .unwrap();
        assert_eq!(found.tier, SearchTier::Group);
        assert_eq!(found.vms.len(), 1);
    }

    #[tokio::test]
    async fn missing_folder_falls_through_to_inventory() {
        let mut plane = MockControlPlane::new();
        plane.expect_list_folders().returning(|_| Ok(vec![]));
        plane
            .expect_list_vms()
            .withf(|f| f.folders.is_empty())
            .returning(|_| Ok(vec![vm("vm-1", "a"), vm("vm-2", "b")]));
        let found = GroupNamespace::new(&plane)
            .find_instances(&scope(), Some("workers"))
            .await
            .unwrap();
        assert_eq!(found.tier, SearchTier::Inventory);
        assert_eq!(found.vms.len(), 2);
    }
}

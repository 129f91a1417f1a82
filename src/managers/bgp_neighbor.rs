use std::collections::HashMap;
use std::net::IpAddr;
use std::str::FromStr;

use log::{debug, info, warn};

use super::{
    check_vrf, parse_field, Dependency, Manager, ManagerContext, ManagerError, DEFAULT_VRF,
};
use crate::models::{Fields, TableId};

/// Split a `"<vrf>:<neighbor>"` key on the first ':'.
/// Keys without a VRF belong to the default VRF.
///
/// ```
/// use bgpcfgd::managers::split_key;
/// assert_eq!(split_key("10.0.0.1"), ("default", "10.0.0.1"));
/// assert_eq!(split_key("Vrf-red:10.0.0.1"), ("Vrf-red", "10.0.0.1"));
/// ```
pub fn split_key(key: &str) -> (&str, &str) {
    match key.split_once(':') {
        Some((vrf, neighbor)) => (vrf, neighbor),
        None => (DEFAULT_VRF, key),
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum AdminStatus {
    Up,
    Down,
}

impl FromStr for AdminStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "up" => Ok(AdminStatus::Up),
            "down" => Ok(AdminStatus::Down),
            _ => Err(()),
        }
    }
}

/// One full BGP_NEIGHBOR row. Upstream always writes the whole row, so
/// an optional field missing from a SET is unset.
#[derive(Clone, Debug, PartialEq)]
struct NeighborRecord {
    asn: u32,
    name: Option<String>,
    admin_status: Option<AdminStatus>,
}

impl NeighborRecord {
    fn parse(fields: &Fields) -> Result<Self, ManagerError> {
        Ok(Self {
            asn: parse_field(fields, "asn")?.ok_or(ManagerError::MissingField("asn"))?,
            name: fields
                .get("name")
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty()),
            admin_status: parse_field(fields, "admin_status")?,
        })
    }

    fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("asn".to_string(), self.asn.to_string());
        if let Some(name) = &self.name {
            fields.insert("name".to_string(), name.clone());
        }
        if let Some(status) = self.admin_status {
            let status = match status {
                AdminStatus::Up => "up",
                AdminStatus::Down => "down",
            };
            fields.insert("admin_status".to_string(), status.to_string());
        }
        fields
    }
}

/// The `router bgp` instance neighbors were configured under
#[derive(Copy, Clone, Debug, PartialEq)]
struct GlobalInstance {
    local_asn: u32,
    incarnation: Option<u64>,
}

/// Key a neighbor is published under, whatever form the event key took
fn directory_key(addr: &IpAddr) -> String {
    format!("{}:{}", DEFAULT_VRF, addr)
}

/// Reconciles the BGP_NEIGHBOR table. Neighbors are configured inside the
/// `router bgp` instance owned by [`super::BgpGlobalManager`], so the local
/// ASN is read from the global table's published record.
///
/// Tearing down that instance removes its neighbors from the routing
/// daemon too. Whenever the published instance disappears or is replaced,
/// every applied neighbor is forgotten so the next SET configures it again.
pub struct BgpNeighborManager {
    table: TableId,
    ctx: ManagerContext,
    deps: Vec<Dependency>,
    instance: Option<GlobalInstance>,
    neighbors: HashMap<IpAddr, NeighborRecord>,
}

impl BgpNeighborManager {
    pub fn new(ctx: &ManagerContext, table: TableId, global: &TableId) -> Self {
        let deps = vec![Dependency::new(
            &global.store,
            &global.table,
            &format!("{}/local_asn", DEFAULT_VRF),
        )];
        ctx.directory.subscribe(&deps);
        debug!("Registering table {} on db {}", table.table, table.store);
        Self {
            table,
            ctx: ctx.clone(),
            deps,
            instance: None,
            neighbors: HashMap::new(),
        }
    }

    /// Whether a `router bgp` instance was present at the last event
    pub fn is_enabled(&self) -> bool {
        self.instance.is_some()
    }

    pub fn neighbor_count(&self) -> usize {
        self.neighbors.len()
    }

    /// Read the current global instance, forgetting neighbors applied
    /// under a previous one
    fn sync_instance(&mut self) -> Result<u32, ManagerError> {
        let dep = self.deps[0].clone();
        let value = match self.ctx.directory.lookup(&dep) {
            Ok(value) => value,
            Err(source) => {
                self.forget_instance();
                return Err(ManagerError::DependencyAbsent {
                    dependency: dep.to_string(),
                    source,
                });
            }
        };
        let local_asn = value
            .trim()
            .parse()
            .map_err(|_| ManagerError::InvalidField {
                field: "local_asn",
                value,
            })?;
        let incarnation = dep
            .key_and_field()
            .ok()
            .and_then(|(key, _)| self.ctx.directory.incarnation(&dep.table, key));
        let current = GlobalInstance {
            local_asn,
            incarnation,
        };
        if self.instance != Some(current) {
            self.forget_instance();
            debug!("local_asn {} found in {}", local_asn, dep.table);
            self.instance = Some(current);
        }
        Ok(local_asn)
    }

    fn forget_instance(&mut self) {
        let instance = match self.instance.take() {
            Some(instance) => instance,
            None => return,
        };
        if !self.neighbors.is_empty() {
            info!(
                "BGP instance AS{} is gone, forgetting {} neighbors",
                instance.local_asn,
                self.neighbors.len()
            );
        }
        for (addr, _) in self.neighbors.drain() {
            self.ctx.directory.remove(&self.table, &directory_key(&addr));
        }
    }

    fn parse_neighbor(neighbor: &str) -> Result<IpAddr, ManagerError> {
        neighbor
            .parse()
            .map_err(|_| ManagerError::InvalidField {
                field: "neighbor",
                value: neighbor.to_string(),
            })
    }
}

/// Commands turning `previous` into `record` for one neighbor
fn neighbor_commands(
    addr: IpAddr,
    previous: Option<&NeighborRecord>,
    record: &NeighborRecord,
) -> Vec<String> {
    let mut cmds = Vec::with_capacity(3);

    if previous.map(|prev| prev.asn) != Some(record.asn) {
        cmds.push(format!("neighbor {} remote-as {}", addr, record.asn));
    }
    if previous.and_then(|prev| prev.name.as_ref()) != record.name.as_ref() {
        match &record.name {
            Some(name) => cmds.push(format!("neighbor {} description {}", addr, name)),
            None => cmds.push(format!("no neighbor {} description", addr)),
        }
    }
    match (previous.and_then(|prev| prev.admin_status), record.admin_status) {
        (old, Some(AdminStatus::Down)) if old != Some(AdminStatus::Down) => {
            cmds.push(format!("neighbor {} shutdown", addr));
        }
        (Some(AdminStatus::Down), None) | (Some(AdminStatus::Down), Some(AdminStatus::Up)) => {
            cmds.push(format!("no neighbor {} shutdown", addr));
        }
        (None, Some(AdminStatus::Up)) => {
            cmds.push(format!("no neighbor {} shutdown", addr));
        }
        _ => (),
    }
    cmds
}

impl Manager for BgpNeighborManager {
    fn table(&self) -> &TableId {
        &self.table
    }

    fn dependencies(&self) -> &[Dependency] {
        &self.deps
    }

    fn set_handler(&mut self, key: &str, fields: &Fields) -> Result<(), ManagerError> {
        debug!("{} set '{}'", self.table, key);
        let (vrf, neighbor) = split_key(key);
        check_vrf(vrf)?;
        let addr = Self::parse_neighbor(neighbor)?;
        let record = NeighborRecord::parse(fields)?;
        let local_asn = self.sync_instance()?;

        let mut cmds = neighbor_commands(addr, self.neighbors.get(&addr), &record);
        if !cmds.is_empty() {
            cmds.insert(0, format!("router bgp {}", local_asn));
        }

        self.ctx
            .directory
            .put(&self.table, &directory_key(&addr), record.to_fields());
        self.neighbors.insert(addr, record);
        self.ctx.sink.push(cmds);
        Ok(())
    }

    fn del_handler(&mut self, key: &str) -> Result<(), ManagerError> {
        debug!("{} del '{}'", self.table, key);
        let (vrf, neighbor) = split_key(key);
        check_vrf(vrf)?;
        let addr = Self::parse_neighbor(neighbor)?;
        let local_asn = match self.sync_instance() {
            Ok(local_asn) => local_asn,
            Err(ManagerError::DependencyAbsent { .. }) => return Err(ManagerError::NotCreated),
            Err(err) => return Err(err),
        };

        self.ctx.directory.remove(&self.table, &directory_key(&addr));
        if self.neighbors.remove(&addr).is_none() {
            warn!("Neighbor {} was never configured, nothing to remove", addr);
            return Ok(());
        }
        self.ctx.sink.push(vec![
            format!("router bgp {}", local_asn),
            format!("no neighbor {}", addr),
        ]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{context, drain, fields};
    use super::*;
    use crate::directory::DirectoryError;
    use crate::models::Operation;

    fn global() -> TableId {
        TableId::new("APPL_DB", "BGP_GLOBAL")
    }

    fn manager(ctx: &ManagerContext) -> BgpNeighborManager {
        BgpNeighborManager::new(ctx, TableId::new("APPL_DB", "BGP_NEIGHBOR"), &global())
    }

    fn publish_global(ctx: &ManagerContext, asn: &str) {
        ctx.directory
            .put(&global(), "default", fields(&[("local_asn", asn)]));
    }

    #[test]
    fn test_split_key() {
        assert_eq!(split_key("n1"), ("default", "n1"));
        assert_eq!(split_key("vrfA:n1"), ("vrfA", "n1"));
        assert_eq!(split_key("a:b:c"), ("a", "b:c"));
        assert_eq!(split_key("default:fc00::1"), ("default", "fc00::1"));
    }

    #[test]
    fn test_declares_global_dependency() {
        let ctx = context();
        let mgr = manager(&ctx);
        assert_eq!(mgr.dependencies().len(), 1);
        assert_eq!(mgr.dependencies()[0].path, "default/local_asn");
        assert!(ctx.directory.subscriptions().contains(&global()));
    }

    #[test]
    fn test_set_before_global_fails() {
        let ctx = context();
        let mut mgr = manager(&ctx);
        let record = fields(&[("asn", "65002")]);
        assert_eq!(
            mgr.set_handler("default:10.0.0.1", &record),
            Err(ManagerError::DependencyAbsent {
                dependency: "APPL_DB:BGP_GLOBAL/default/local_asn".to_string(),
                source: DirectoryError::SlotAbsent(global()),
            })
        );
        assert!(!mgr.is_enabled());
        assert!(ctx.sink.pending().is_empty());

        publish_global(&ctx, "65001");
        assert!(mgr.handler("default:10.0.0.1", Operation::Set, &record));
        assert!(mgr.is_enabled());
        assert_eq!(
            drain(&ctx),
            vec!["router bgp 65001", "neighbor 10.0.0.1 remote-as 65002"]
        );
    }

    #[test]
    fn test_global_removal_forgets_neighbors() {
        let ctx = context();
        let mut mgr = manager(&ctx);
        publish_global(&ctx, "65001");
        mgr.set_handler("10.0.0.1", &fields(&[("asn", "65002")]))
            .unwrap();
        drain(&ctx);
        ctx.directory.remove(&global(), "default");

        assert!(matches!(
            mgr.set_handler("10.0.0.2", &fields(&[("asn", "65003")])),
            Err(ManagerError::DependencyAbsent { .. })
        ));
        assert!(!mgr.is_enabled());
        assert_eq!(mgr.neighbor_count(), 0);
        assert!(!ctx.directory.contains(mgr.table(), "default:10.0.0.1"));
        assert_eq!(
            mgr.del_handler("10.0.0.1"),
            Err(ManagerError::NotCreated)
        );
        assert!(ctx.sink.pending().is_empty());
    }

    #[test]
    fn test_recreated_global_reconfigures_neighbors() {
        let ctx = context();
        let mut mgr = manager(&ctx);
        let record = fields(&[("asn", "65002")]);
        publish_global(&ctx, "65001");
        mgr.set_handler("10.0.0.1", &record).unwrap();
        drain(&ctx);

        // Same ASN: the instance was still torn down in between
        ctx.directory.remove(&global(), "default");
        publish_global(&ctx, "65001");
        mgr.set_handler("10.0.0.1", &record).unwrap();
        assert_eq!(
            drain(&ctx),
            vec!["router bgp 65001", "neighbor 10.0.0.1 remote-as 65002"]
        );

        ctx.directory.remove(&global(), "default");
        publish_global(&ctx, "65100");
        mgr.set_handler("10.0.0.2", &fields(&[("asn", "65003")]))
            .unwrap();
        assert_eq!(
            drain(&ctx),
            vec!["router bgp 65100", "neighbor 10.0.0.2 remote-as 65003"]
        );
        assert_eq!(mgr.neighbor_count(), 1);
        assert!(!ctx.directory.contains(mgr.table(), "default:10.0.0.1"));
    }

    #[test]
    fn test_global_update_keeps_neighbors() {
        let ctx = context();
        let mut mgr = manager(&ctx);
        let record = fields(&[("asn", "65002")]);
        publish_global(&ctx, "65001");
        mgr.set_handler("10.0.0.1", &record).unwrap();
        drain(&ctx);

        ctx.directory.put(
            &global(),
            "default",
            fields(&[("local_asn", "65001"), ("router_id", "1.1.1.1")]),
        );
        mgr.set_handler("10.0.0.1", &record).unwrap();
        assert!(drain(&ctx).is_empty());
        assert_eq!(mgr.neighbor_count(), 1);
    }

    #[test]
    fn test_key_forms_share_identity() {
        let ctx = context();
        let mut mgr = manager(&ctx);
        publish_global(&ctx, "65001");
        let record = fields(&[("asn", "65002")]);
        mgr.set_handler("10.0.0.1", &record).unwrap();
        drain(&ctx);

        mgr.set_handler("default:10.0.0.1", &record).unwrap();
        assert!(drain(&ctx).is_empty());
        assert_eq!(ctx.directory.get(mgr.table()).unwrap().len(), 1);

        mgr.del_handler("default:10.0.0.1").unwrap();
        assert_eq!(mgr.neighbor_count(), 0);
        assert!(!ctx.directory.contains(mgr.table(), "10.0.0.1"));
        assert!(!ctx.directory.contains(mgr.table(), "default:10.0.0.1"));
    }

    #[test]
    fn test_replay_emits_nothing() {
        let ctx = context();
        let mut mgr = manager(&ctx);
        publish_global(&ctx, "65001");
        let record = fields(&[("asn", "65002")]);
        mgr.set_handler("default:10.0.0.1", &record).unwrap();
        drain(&ctx);

        mgr.set_handler("default:10.0.0.1", &record).unwrap();
        assert!(drain(&ctx).is_empty());
        assert_eq!(mgr.neighbor_count(), 1);
    }

    #[test]
    fn test_updates_emit_only_delta() {
        let ctx = context();
        let mut mgr = manager(&ctx);
        publish_global(&ctx, "65001");
        mgr.set_handler(
            "default:10.0.0.1",
            &fields(&[("asn", "65002"), ("name", "spine1")]),
        )
        .unwrap();
        assert_eq!(
            drain(&ctx),
            vec![
                "router bgp 65001",
                "neighbor 10.0.0.1 remote-as 65002",
                "neighbor 10.0.0.1 description spine1",
            ]
        );

        mgr.set_handler(
            "default:10.0.0.1",
            &fields(&[("asn", "65002"), ("name", "spine1"), ("admin_status", "down")]),
        )
        .unwrap();
        assert_eq!(
            drain(&ctx),
            vec!["router bgp 65001", "neighbor 10.0.0.1 shutdown"]
        );

        // Fields left out of the row are unset
        mgr.set_handler("default:10.0.0.1", &fields(&[("asn", "65010")]))
            .unwrap();
        assert_eq!(
            drain(&ctx),
            vec![
                "router bgp 65001",
                "neighbor 10.0.0.1 remote-as 65010",
                "no neighbor 10.0.0.1 description",
                "no neighbor 10.0.0.1 shutdown",
            ]
        );
    }

    #[test]
    fn test_every_set_requires_asn() {
        let ctx = context();
        let mut mgr = manager(&ctx);
        publish_global(&ctx, "65001");
        assert_eq!(
            mgr.set_handler("10.0.0.1", &fields(&[("name", "spine1")])),
            Err(ManagerError::MissingField("asn"))
        );
        assert!(ctx.sink.pending().is_empty());
        assert!(!ctx.directory.contains(mgr.table(), "default:10.0.0.1"));

        mgr.set_handler("10.0.0.1", &fields(&[("asn", "65002"), ("name", "spine1")]))
            .unwrap();
        drain(&ctx);
        // A row without asn is rejected rather than merged
        assert_eq!(
            mgr.set_handler("10.0.0.1", &fields(&[("name", "spine2")])),
            Err(ManagerError::MissingField("asn"))
        );
        assert!(ctx.sink.pending().is_empty());
        let published = ctx.directory.get(mgr.table()).unwrap();
        assert_eq!(published["default:10.0.0.1"]["name"], "spine1");
    }

    #[test]
    fn test_validation_errors() {
        let ctx = context();
        let mut mgr = manager(&ctx);
        publish_global(&ctx, "65001");
        let record = fields(&[("asn", "65002")]);
        assert_eq!(
            mgr.set_handler("Vrf-red:10.0.0.1", &record),
            Err(ManagerError::UnsupportedVrf("Vrf-red".to_string()))
        );
        assert!(matches!(
            mgr.set_handler("default:spine1", &record),
            Err(ManagerError::InvalidField {
                field: "neighbor",
                ..
            })
        ));
        assert!(matches!(
            mgr.set_handler(
                "default:10.0.0.1",
                &fields(&[("asn", "65002"), ("admin_status", "sideways")])
            ),
            Err(ManagerError::InvalidField {
                field: "admin_status",
                ..
            })
        ));
        assert!(ctx.sink.pending().is_empty());
    }

    #[test]
    fn test_delete_requires_enabled() {
        let ctx = context();
        let mut mgr = manager(&ctx);
        assert_eq!(
            mgr.del_handler("default:10.0.0.1"),
            Err(ManagerError::NotCreated)
        );
        assert!(ctx.sink.pending().is_empty());
    }

    #[test]
    fn test_set_delete_round_trip() {
        let ctx = context();
        let mut mgr = manager(&ctx);
        publish_global(&ctx, "65001");
        let record = fields(&[("asn", "65002")]);

        mgr.set_handler("default:10.0.0.1", &record).unwrap();
        let first = drain(&ctx);
        assert!(ctx.directory.contains(mgr.table(), "default:10.0.0.1"));

        assert!(mgr.handler("default:10.0.0.1", Operation::Delete, &Fields::new()));
        assert_eq!(
            drain(&ctx),
            vec!["router bgp 65001", "no neighbor 10.0.0.1"]
        );
        assert!(!ctx.directory.contains(mgr.table(), "default:10.0.0.1"));
        assert_eq!(mgr.neighbor_count(), 0);

        mgr.set_handler("default:10.0.0.1", &record).unwrap();
        assert_eq!(drain(&ctx), first);
    }

    #[test]
    fn test_delete_unknown_neighbor() {
        let ctx = context();
        let mut mgr = manager(&ctx);
        publish_global(&ctx, "65001");
        mgr.set_handler("10.0.0.1", &fields(&[("asn", "65002")]))
            .unwrap();
        drain(&ctx);

        assert!(mgr.handler("10.0.0.9", Operation::Delete, &Fields::new()));
        assert!(ctx.sink.pending().is_empty());
    }
}

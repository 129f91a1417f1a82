use std::fmt;
use std::net::Ipv4Addr;

use log::debug;

use super::{check_vrf, parse_field, Manager, ManagerContext, ManagerError};
use crate::models::{Fields, TableId};

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum GlobalState {
    Disabled,
    Enabled { local_asn: u32 },
}

impl fmt::Display for GlobalState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GlobalState::Disabled => write!(f, "Disabled"),
            GlobalState::Enabled { local_asn } => write!(f, "Enabled (AS{})", local_asn),
        }
    }
}

/// One full BGP_GLOBAL row; a missing router_id is unset
#[derive(Debug, PartialEq)]
struct GlobalRecord {
    local_asn: u32,
    router_id: Option<Ipv4Addr>,
}

impl GlobalRecord {
    fn parse(fields: &Fields) -> Result<Self, ManagerError> {
        Ok(Self {
            local_asn: parse_field(fields, "local_asn")?
                .ok_or(ManagerError::MissingField("local_asn"))?,
            router_id: parse_field(fields, "router_id")?,
        })
    }
}

/// Reconciles the BGP_GLOBAL table: the `router bgp` instance itself
pub struct BgpGlobalManager {
    table: TableId,
    ctx: ManagerContext,
    state: GlobalState,
    router_id: Option<Ipv4Addr>,
}

impl BgpGlobalManager {
    pub fn new(ctx: &ManagerContext, table: TableId) -> Self {
        debug!("Registering table {} on db {}", table.table, table.store);
        Self {
            table,
            ctx: ctx.clone(),
            state: GlobalState::Disabled,
            router_id: None,
        }
    }

    pub fn state(&self) -> GlobalState {
        self.state
    }

    /// Facts other managers may depend on, keyed by field name
    fn published_fields(&self, local_asn: u32) -> Fields {
        let mut fields = Fields::new();
        fields.insert("local_asn".to_string(), local_asn.to_string());
        if let Some(router_id) = self.router_id {
            fields.insert("router_id".to_string(), router_id.to_string());
        }
        fields
    }
}

impl Manager for BgpGlobalManager {
    fn table(&self) -> &TableId {
        &self.table
    }

    fn set_handler(&mut self, key: &str, fields: &Fields) -> Result<(), ManagerError> {
        debug!("{} set '{}'", self.table, key);
        check_vrf(key)?;
        let record = GlobalRecord::parse(fields)?;

        let mut cmds: Vec<String> = Vec::with_capacity(3);
        let local_asn = match self.state {
            GlobalState::Disabled => {
                let local_asn = record.local_asn;
                cmds.push(format!("router bgp {}", local_asn));
                cmds.push("no bgp default ipv4-unicast".to_string());
                if let Some(router_id) = record.router_id {
                    cmds.push(format!("bgp router-id {}", router_id));
                }
                local_asn
            }
            GlobalState::Enabled { local_asn } => {
                if record.local_asn != local_asn {
                    // Needs a full teardown of the instance first
                    return Err(ManagerError::AsnChange {
                        current: local_asn,
                        requested: record.local_asn,
                    });
                }
                match (self.router_id, record.router_id) {
                    (current, Some(router_id)) if current != Some(router_id) => {
                        cmds.push(format!("bgp router-id {}", router_id));
                    }
                    (Some(_), None) => cmds.push("no bgp router-id".to_string()),
                    _ => (),
                }
                if !cmds.is_empty() {
                    cmds.insert(0, format!("router bgp {}", local_asn));
                }
                local_asn
            }
        };

        if self.state == GlobalState::Disabled {
            debug!("{} enabled with AS{}", self.table, local_asn);
        }
        self.state = GlobalState::Enabled { local_asn };
        self.router_id = record.router_id;
        self.ctx
            .directory
            .put(&self.table, key, self.published_fields(local_asn));
        self.ctx.sink.push(cmds);
        Ok(())
    }

    fn del_handler(&mut self, key: &str) -> Result<(), ManagerError> {
        debug!("{} del '{}'", self.table, key);
        check_vrf(key)?;
        let local_asn = match self.state {
            GlobalState::Enabled { local_asn } => local_asn,
            GlobalState::Disabled => return Err(ManagerError::NotCreated),
        };

        self.state = GlobalState::Disabled;
        self.router_id = None;
        self.ctx.directory.remove(&self.table, key);
        self.ctx
            .sink
            .push(vec![format!("no router bgp {}", local_asn)]);
        Ok(())
    }
}

//! Flow program builder.
//!
//! Translates declarative flow, group, meter and table operations into
//! OpenFlow messages and hands them to the datapath. Table names are
//! resolved through the pipeline's [`TableRegistry`]; the builder itself
//! keeps no state.

use crate::error::PipelineResult;
use crate::tables::TableRegistry;
use tipsy_openflow::{
    Action, Bucket, Datapath, FlowMod, FlowModCommand, GroupId, GroupMod, GroupModCommand,
    GroupType, Instruction, Match, MeterBand, MeterId, MeterMod, MeterModCommand, OfpMessage,
    PortNo, TableId, OFP_DEFAULT_PRIORITY,
};
use tracing::debug;

/// A table given by name or by id.
///
/// Names are looked up in the pipeline's [`TableRegistry`] when the flow is
/// built; ids are used as they are.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableRef {
    /// Logical table name, e.g. `"forward"`.
    Name(String),
    /// Raw OpenFlow table id.
    Id(TableId),
}

impl From<&str> for TableRef {
    fn from(name: &str) -> Self {
        TableRef::Name(name.to_string())
    }
}

impl From<String> for TableRef {
    fn from(name: String) -> Self {
        TableRef::Name(name)
    }
}

impl From<TableId> for TableRef {
    fn from(id: TableId) -> Self {
        TableRef::Id(id)
    }
}

/// One flow entry to add or delete.
///
/// ```
/// use tipsy_openflow::{Match, PortNo};
/// use tipsy_pipeline::FlowSpec;
///
/// let spec = FlowSpec::new("forward")
///     .matching(Match::new().in_port(PortNo(1)))
///     .output(PortNo(2));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct FlowSpec {
    /// Table the entry lives in.
    pub table: TableRef,
    /// Entry priority; the OpenFlow default when unset.
    pub priority: Option<u16>,
    pub matches: Match,
    /// Applied actions, in order.
    pub actions: Vec<Action>,
    /// Instructions appended after apply-actions and goto-table.
    pub instructions: Vec<Instruction>,
    /// Shorthand for a trailing output action.
    pub output: Option<PortNo>,
    /// Table to continue in after this entry.
    pub goto: Option<TableRef>,
    pub command: FlowModCommand,
    /// Delete filter on output port, `ANY` when unset.
    pub out_port: Option<PortNo>,
    /// Delete filter on output group, `ANY` when unset.
    pub out_group: Option<GroupId>,
}

impl FlowSpec {
    /// An empty add in `table`: wildcard match, default priority, no
    /// actions.
    pub fn new(table: impl Into<TableRef>) -> Self {
        Self {
            table: table.into(),
            priority: None,
            matches: Match::default(),
            actions: Vec::new(),
            instructions: Vec::new(),
            output: None,
            goto: None,
            command: FlowModCommand::Add,
            out_port: None,
            out_group: None,
        }
    }

    pub fn priority(mut self, priority: u16) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn matching(mut self, matches: Match) -> Self {
        self.matches = matches;
        self
    }

    /// Appends one applied action.
    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    pub fn actions(mut self, actions: impl IntoIterator<Item = Action>) -> Self {
        self.actions.extend(actions);
        self
    }

    pub fn instruction(mut self, instruction: Instruction) -> Self {
        self.instructions.push(instruction);
        self
    }

    pub fn instructions(mut self, instructions: impl IntoIterator<Item = Instruction>) -> Self {
        self.instructions.extend(instructions);
        self
    }

    pub fn output(mut self, port: PortNo) -> Self {
        self.output = Some(port);
        self
    }

    /// Continues processing in `table` after this entry.
    pub fn goto(mut self, table: impl Into<TableRef>) -> Self {
        self.goto = Some(table.into());
        self
    }

    /// Turns the spec into a non-strict delete: every entry in the table
    /// whose match is covered by this one goes.
    pub fn delete(mut self) -> Self {
        self.command = FlowModCommand::Delete;
        self
    }

    /// Deletes only the entry with exactly this match and priority.
    pub fn delete_strict(mut self) -> Self {
        self.command = FlowModCommand::DeleteStrict;
        self
    }

    pub fn out_port(mut self, port: PortNo) -> Self {
        self.out_port = Some(port);
        self
    }

    pub fn out_group(mut self, group: GroupId) -> Self {
        self.out_group = Some(group);
        self
    }
}

/// Sends flow, group and meter modifications for one pipeline to one
/// switch.
///
/// The builder borrows the datapath and the table layout and is `Copy`, so
/// plugins pass it around freely. Every operation sends exactly one message
/// and returns as soon as it is queued; errors reported by the switch
/// arrive later as error messages.
///
/// # Example
///
/// ```ignore
/// let flows = FlowBuilder::new(dp.as_ref(), plugin.tables());
/// flows.install_flow(
///     FlowSpec::new("forward")
///         .priority(10)
///         .matching(Match::new().in_port(uplink))
///         .output(downlink),
/// )?;
/// flows.barrier()?;
/// ```
#[derive(Clone, Copy)]
pub struct FlowBuilder<'a> {
    dp: &'a dyn Datapath,
    tables: &'a TableRegistry,
}

impl<'a> FlowBuilder<'a> {
    /// # Arguments
    ///
    /// * `dp` - the connected switch
    /// * `tables` - the pipeline's table layout, used to resolve names
    pub fn new(dp: &'a dyn Datapath, tables: &'a TableRegistry) -> Self {
        Self { dp, tables }
    }

    pub fn tables(&self) -> &'a TableRegistry {
        self.tables
    }

    fn table_id(&self, table: &TableRef) -> PipelineResult<TableId> {
        match table {
            TableRef::Name(name) => self.tables.resolve(name),
            TableRef::Id(id) => Ok(*id),
        }
    }

    /// Builds the flow-mod for `spec` without sending it.
    ///
    /// Instruction order is apply-actions (when any action is given), then
    /// goto-table, then the explicit instructions.
    pub fn build(&self, spec: FlowSpec) -> PipelineResult<FlowMod> {
        let FlowSpec {
            table,
            priority,
            matches,
            mut actions,
            instructions,
            output,
            goto,
            command,
            out_port,
            out_group,
        } = spec;

        let mut fm = FlowMod::new(self.table_id(&table)?, command);
        fm.priority = priority.unwrap_or(OFP_DEFAULT_PRIORITY);
        fm.matches = matches;
        fm.out_port = out_port.unwrap_or(PortNo::ANY);
        fm.out_group = out_group.unwrap_or(GroupId::ANY);

        if let Some(port) = output {
            actions.push(Action::output(port));
        }
        if !actions.is_empty() {
            fm.instructions.push(Instruction::ApplyActions(actions));
        }
        if let Some(goto) = goto {
            fm.instructions
                .push(Instruction::GotoTable(self.table_id(&goto)?));
        }
        fm.instructions.extend(instructions);
        Ok(fm)
    }

    /// Builds `spec` and sends it.
    ///
    /// # Returns
    ///
    /// * `Err(PipelineError::UnknownTable)` - a table name is not in the
    ///   registry; nothing is sent
    /// * `Err(PipelineError::Datapath)` - the switch connection is gone
    pub fn install_flow(&self, spec: FlowSpec) -> PipelineResult<()> {
        let fm = self.build(spec)?;
        debug!(
            table = %fm.table_id,
            priority = fm.priority,
            command = ?fm.command,
            "flow_mod"
        );
        self.dp.send_msg(fm.into())?;
        Ok(())
    }

    /// Adds a group with a single zero-weight bucket.
    pub fn install_group(
        &self,
        group_id: GroupId,
        actions: Vec<Action>,
        group_type: GroupType,
    ) -> PipelineResult<()> {
        debug!(group = %group_id, ?group_type, "group add");
        self.dp.send_msg(
            GroupMod {
                command: GroupModCommand::Add,
                group_type,
                group_id,
                buckets: vec![Bucket::new(actions)],
            }
            .into(),
        )?;
        Ok(())
    }

    /// Deletes a group. The switch also drops the flows that point at it.
    pub fn remove_group(&self, group_id: GroupId, group_type: GroupType) -> PipelineResult<()> {
        debug!(group = %group_id, ?group_type, "group delete");
        self.dp.send_msg(
            GroupMod {
                command: GroupModCommand::Delete,
                group_type,
                group_id,
                buckets: Vec::new(),
            }
            .into(),
        )?;
        Ok(())
    }

    /// Deletes every flow in one table.
    pub fn clear_table(&self, table_id: TableId) -> PipelineResult<()> {
        debug!(table = %table_id, "clear table");
        self.dp
            .send_msg(FlowMod::new(table_id, FlowModCommand::Delete).into())?;
        Ok(())
    }

    /// Adds a kbps meter with a single drop band.
    pub fn install_meter(&self, meter_id: MeterId, rate_kbps: u32) -> PipelineResult<()> {
        debug!(meter = %meter_id, rate_kbps, "meter add");
        self.dp.send_msg(
            MeterMod {
                command: MeterModCommand::Add,
                kbps: true,
                meter_id,
                bands: vec![MeterBand::Drop {
                    rate: rate_kbps,
                    burst_size: 0,
                }],
            }
            .into(),
        )?;
        Ok(())
    }

    /// Deletes a meter and the flows that use it.
    pub fn remove_meter(&self, meter_id: MeterId) -> PipelineResult<()> {
        debug!(meter = %meter_id, "meter delete");
        self.dp.send_msg(
            MeterMod {
                command: MeterModCommand::Delete,
                kbps: true,
                meter_id,
                bands: Vec::new(),
            }
            .into(),
        )?;
        Ok(())
    }

    /// Sends a barrier request. Everything sent before it is processed
    /// before the reply.
    pub fn barrier(&self) -> PipelineResult<()> {
        self.dp.send_msg(OfpMessage::BarrierRequest)?;
        Ok(())
    }
}

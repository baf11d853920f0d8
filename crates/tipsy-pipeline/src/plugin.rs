//! The pipeline plugin interface.
//!
//! A plugin owns one pipeline type: its table layout, the initial flow
//! program and the handlers for runtime commands. Plugins never talk to the
//! switch directly; they get a [`PipelineContext`] carrying a
//! [`FlowBuilder`] and the resolved ports.

use crate::config::Command;
use crate::error::PipelineResult;
use crate::flow::FlowBuilder;
use crate::ports::PortTable;
use crate::tables::TableRegistry;
use std::fmt;
use tipsy_openflow::PortNo;
use tracing::warn;

/// What a plugin is allowed to touch while configuring the switch or
/// executing a runtime command.
#[derive(Clone, Copy)]
pub struct PipelineContext<'a> {
    pub flows: FlowBuilder<'a>,
    /// Port names reported by the switch.
    pub ports: &'a PortTable,
    /// Port facing the traffic generator's upstream side.
    pub uplink: PortNo,
    pub downlink: PortNo,
}

/// Result of offering a command to a plugin's action handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionStatus {
    /// The handler ran.
    Done,
    /// The plugin has no handler for this action.
    Unsupported,
}

/// One pipeline type.
///
/// Implementors provide the table layout and the initial flow program;
/// runtime commands are optional. A plugin is built once per controller
/// run and keeps whatever state its runtime commands need, such as the
/// users currently installed.
///
/// # Example
///
/// ```ignore
/// #[derive(Debug)]
/// struct Mirror {
///     tables: TableRegistry,
/// }
///
/// impl PipelinePlugin for Mirror {
///     fn name(&self) -> &'static str {
///         "mirror"
///     }
///
///     fn tables(&self) -> &TableRegistry {
///         &self.tables
///     }
///
///     fn config_switch(&mut self, ctx: &PipelineContext<'_>) -> PipelineResult<()> {
///         ctx.flows.install_flow(
///             FlowSpec::new("mirror")
///                 .matching(Match::new().in_port(ctx.uplink))
///                 .output(ctx.downlink),
///         )
///     }
/// }
/// ```
pub trait PipelinePlugin: Send + fmt::Debug {
    /// Pipeline name as written in the configuration.
    fn name(&self) -> &'static str;

    /// Table layout, fixed at construction.
    fn tables(&self) -> &TableRegistry;

    /// Installs the pipeline's flow program.
    ///
    /// Called after the drop rules are in place and before the barrier
    /// that completes configuration. Called again after every reconnect.
    fn config_switch(&mut self, ctx: &PipelineContext<'_>) -> PipelineResult<()>;

    /// Runs the handler for `cmd.action`, if the plugin has one.
    ///
    /// # Returns
    ///
    /// * `Ok(ActionStatus::Done)` - the handler ran
    /// * `Ok(ActionStatus::Unsupported)` - no handler for this action
    /// * `Err(_)` - the handler failed; later commands of the same timer
    ///   firing are skipped
    fn do_action(
        &mut self,
        _ctx: &PipelineContext<'_>,
        _cmd: &Command,
    ) -> PipelineResult<ActionStatus> {
        Ok(ActionStatus::Unsupported)
    }

    /// Fallback for actions without a handler.
    fn do_unknown(&mut self, _ctx: &PipelineContext<'_>, cmd: &Command) -> PipelineResult<()> {
        warn!(pipeline = self.name(), action = %cmd.action, "unknown action");
        Ok(())
    }
}

/// Dispatches one command to its handler, falling back to
/// [`PipelinePlugin::do_unknown`].
pub fn dispatch(
    plugin: &mut dyn PipelinePlugin,
    ctx: &PipelineContext<'_>,
    cmd: &Command,
) -> PipelineResult<()> {
    match plugin.do_action(ctx, cmd)? {
        ActionStatus::Done => Ok(()),
        ActionStatus::Unsupported => plugin.do_unknown(ctx, cmd),
    }
}

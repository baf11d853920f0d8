//! Default drop rules.
//!
//! Every table gets a priority-0 rule sending unmatched packets to the drop
//! table, so drops show up in one place in the switch counters. With
//! `fakedrop` enabled the drop table instead cross-connects the uplink and
//! downlink ports, which bypasses the pipeline and tests the traffic
//! generator setup on its own.

use crate::error::PipelineResult;
use crate::flow::{FlowBuilder, FlowSpec};
use crate::tables::DROP_TABLE;
use tipsy_openflow::{Match, PortNo};
use tracing::{debug, info};

/// Installs the drop-table rules and returns how many flows were sent.
///
/// # Arguments
///
/// * `flows` - builder bound to the switch and the pipeline's tables
/// * `fakedrop` - the configuration flag; unset behaves like `false`
/// * `uplink`, `downlink` - resolved benchmark ports
///
/// # Returns
///
/// The number of flow-mods sent: zero without a drop table, two with
/// `fakedrop`, otherwise one per table.
pub fn install_fakedrop_rules(
    flows: &FlowBuilder<'_>,
    fakedrop: Option<bool>,
    uplink: PortNo,
    downlink: PortNo,
) -> PipelineResult<usize> {
    let tables = flows.tables();
    if !tables.contains(DROP_TABLE) {
        debug!("pipeline has no drop table, skipping default drop rules");
        return Ok(0);
    }

    if fakedrop.unwrap_or(false) {
        info!(%uplink, %downlink, "fakedrop: cross-connecting uplink and downlink");
        flows.install_flow(
            FlowSpec::new(DROP_TABLE)
                .matching(Match::new().in_port(uplink))
                .output(downlink),
        )?;
        flows.install_flow(
            FlowSpec::new(DROP_TABLE)
                .matching(Match::new().in_port(downlink))
                .output(uplink),
        )?;
        return Ok(2);
    }

    let mut count = 0;
    for (name, id) in tables.iter() {
        if name != DROP_TABLE {
            flows.install_flow(FlowSpec::new(id).priority(0).goto(DROP_TABLE))?;
            count += 1;
        }
    }
    flows.install_flow(FlowSpec::new(DROP_TABLE).priority(0))?;
    Ok(count + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::TableRegistry;
    use pretty_assertions::assert_eq;
    use tipsy_openflow::{DatapathId, MemoryDatapath, TableId};

    const UL: PortNo = PortNo(1);
    const DL: PortNo = PortNo(2);

    #[test]
    fn test_absent_installs_goto_drop() {
        let dp = MemoryDatapath::new(DatapathId(1));
        let tables = TableRegistry::sequential(["classify", "forward", "drop"]);
        let flows = FlowBuilder::new(&dp, &tables);

        assert_eq!(install_fakedrop_rules(&flows, None, UL, DL).unwrap(), 3);

        let fms = dp.flow_mods();
        assert_eq!(fms.len(), 3);
        assert_eq!(fms[0].table_id, TableId(0));
        assert_eq!(fms[0].goto_table(), Some(TableId(2)));
        assert_eq!(fms[1].table_id, TableId(1));
        assert_eq!(fms[1].goto_table(), Some(TableId(2)));
        assert!(fms.iter().all(|fm| fm.priority == 0));
        assert_eq!(fms[2].table_id, TableId(2));
        assert!(fms[2].instructions.is_empty());
        assert!(fms.iter().all(|fm| fm.output_ports().is_empty()));
    }

    #[test]
    fn test_false_same_as_absent() {
        let dp = MemoryDatapath::new(DatapathId(1));
        let tables = TableRegistry::sequential(["forward", "drop"]);
        let flows = FlowBuilder::new(&dp, &tables);
        install_fakedrop_rules(&flows, Some(false), UL, DL).unwrap();
        assert_eq!(dp.flow_mods().len(), 2);
    }

    #[test]
    fn test_true_cross_connects() {
        let dp = MemoryDatapath::new(DatapathId(1));
        let tables = TableRegistry::sequential(["classify", "forward", "drop"]);
        let flows = FlowBuilder::new(&dp, &tables);

        assert_eq!(install_fakedrop_rules(&flows, Some(true), UL, DL).unwrap(), 2);

        let fms = dp.flow_mods();
        assert_eq!(fms.len(), 2);
        assert!(fms.iter().all(|fm| fm.goto_table().is_none()));
        assert!(fms.iter().all(|fm| fm.table_id == TableId(2)));
        assert_eq!(fms[0].matches.in_port, Some(UL));
        assert_eq!(fms[0].output_ports(), vec![DL]);
        assert_eq!(fms[1].matches.in_port, Some(DL));
        assert_eq!(fms[1].output_ports(), vec![UL]);
    }

    #[test]
    fn test_no_drop_table() {
        let dp = MemoryDatapath::new(DatapathId(1));
        let tables = TableRegistry::sequential(["forward"]);
        let flows = FlowBuilder::new(&dp, &tables);
        assert_eq!(install_fakedrop_rules(&flows, None, UL, DL).unwrap(), 0);
        assert!(dp.messages().is_empty());
    }
}

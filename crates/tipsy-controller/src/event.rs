//! Messages consumed by the control loop.

use tipsy_openflow::DatapathEvent;

/// Everything the control task reacts to. Handlers run one at a time in
/// arrival order.
#[derive(Debug)]
pub enum ControlEvent {
    /// Reported by the protocol adapter.
    Datapath(DatapathEvent),
    /// One benchmark timer tick. At most one is queued at a time.
    TimerFired,
    /// The ticker found a firing still executing.
    TimerOverrun,
    /// Time to rewrite the default gateway's ARP entry.
    ArpRefresh,
    /// Release the switch and leave the loop.
    Exit,
}

impl ControlEvent {
    /// Short name for log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ControlEvent::Datapath(ev) => ev.kind(),
            ControlEvent::TimerFired => "timer_fired",
            ControlEvent::TimerOverrun => "timer_overrun",
            ControlEvent::ArpRefresh => "arp_refresh",
            ControlEvent::Exit => "exit",
        }
    }
}

impl From<DatapathEvent> for ControlEvent {
    fn from(ev: DatapathEvent) -> Self {
        ControlEvent::Datapath(ev)
    }
}

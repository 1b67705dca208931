//! Wireless association state machine.
//!
//! ```text
//!            connect() ok                 link up
//!   ───────▶ Associating ───────────────▶ Associated
//!               │  no SSID / failed /        │
//!               │  timeout                   │ link lost
//!               ▼                            ▼
//!            Unassociated ◀──────────── (reconnect now)
//!               │
//!               └── retry when the backoff deadline passes
//! ```
//!
//! The task's own period doubles as the poll rate: fast while an attempt
//! is in flight, slow while associated, the backoff delay while waiting to
//! retry.

use log::{info, warn};

use crate::app::ports::{AccessPoint, EnterpriseCredentials, LinkStatus, WifiDriver};
use crate::config::{NetworkConfig, NetworkTiming};
use crate::error::{Error, Result};
use crate::events::{Event, EventHandler, EventKind, Payload};
use crate::scheduler::{Context, Task};

pub const REASON_NOT_DETECTABLE: &str = "SSID not detectable";
pub const REASON_NO_SSID: &str = "No SSID Available";
pub const REASON_FAILED: &str = "Failed";
pub const REASON_TIMEOUT: &str = "Connection timeout";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationState {
    Associating,
    Associated,
    Unassociated,
}

/// Doubling retry delay.  The first failure waits `base`.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    base_ms: u64,
    max_ms: u64,
    current_ms: u64,
}

impl Backoff {
    pub fn new(base_ms: u64, max_ms: u64) -> Self {
        Self {
            base_ms,
            max_ms: max_ms.max(base_ms),
            current_ms: base_ms,
        }
    }

    /// Delay for this failure; the next one waits twice as long, up to
    /// the cap.
    pub fn next_delay(&mut self) -> u64 {
        let delay = self.current_ms;
        self.current_ms = self.current_ms.saturating_mul(2).min(self.max_ms);
        delay
    }

    pub fn peek(&self) -> u64 {
        self.current_ms
    }

    pub fn reset(&mut self) {
        self.current_ms = self.base_ms;
    }
}

pub struct AssociationTask<W> {
    wifi: W,
    network: NetworkConfig,
    timing: NetworkTiming,
    state: AssociationState,
    attempt_started_ms: u64,
    backoff: Backoff,
}

impl<W: WifiDriver> AssociationTask<W> {
    pub fn new(wifi: W, network: NetworkConfig, timing: NetworkTiming) -> Self {
        Self {
            wifi,
            network,
            timing,
            state: AssociationState::Unassociated,
            attempt_started_ms: 0,
            backoff: Backoff::new(timing.retry_base_ms, timing.retry_max_ms),
        }
    }

    pub fn state(&self) -> AssociationState {
        self.state
    }

    /// Strongest visible access point broadcasting `ssid`.  Ties keep the
    /// first one scanned.
    pub fn strongest<'a>(aps: &'a [AccessPoint], ssid: &str) -> Option<&'a AccessPoint> {
        aps.iter()
            .filter(|ap| ap.ssid.as_str() == ssid)
            .fold(None, |best: Option<&AccessPoint>, ap| match best {
                Some(b) if b.rssi >= ap.rssi => Some(b),
                _ => Some(ap),
            })
    }

    /// Scan and start associating with the best matching access point.
    pub fn connect(&mut self, ctx: &mut Context<'_>) -> Result<()> {
        let aps = self.wifi.scan();
        let Some(ap) = Self::strongest(&aps, &self.network.wifi_ssid).cloned() else {
            warn!(
                "Wifi: '{}' not among {} scanned networks",
                self.network.wifi_ssid,
                aps.len()
            );
            return Err(self.fail(ctx, REASON_NOT_DETECTABLE));
        };

        info!(
            "Wifi: joining '{}' via {} on channel {} ({} dBm)",
            ap.ssid,
            format_bssid(&ap.bssid),
            ap.channel,
            ap.rssi
        );
        let credentials = EnterpriseCredentials {
            user: &self.network.wifi_user,
            password: &self.network.wifi_pass,
        };
        if let Err(e) = self.wifi.begin(&ap, &credentials) {
            warn!("Wifi: {}", e);
            return Err(self.fail(ctx, REASON_FAILED));
        }

        self.state = AssociationState::Associating;
        self.attempt_started_ms = ctx.now_ms();
        ctx.set_period(self.timing.associating_poll_ms);
        ctx.signal(EventKind::WifiConnecting);
        Ok(())
    }

    /// Drop the link and stop.
    pub fn disconnect(&mut self, ctx: &mut Context<'_>) {
        self.wifi.disconnect();
        ctx.disable();
        if self.state != AssociationState::Unassociated {
            self.state = AssociationState::Unassociated;
            ctx.signal(EventKind::WifiDisconnected);
        }
    }

    fn fail(&mut self, ctx: &mut Context<'_>, reason: &'static str) -> Error {
        let delay = self.backoff.next_delay();
        warn!("Wifi: {}; retrying in {} s", reason, delay / 1000);
        self.state = AssociationState::Unassociated;
        ctx.set_period(delay);
        ctx.dispatch(EventKind::WifiConnectFailed, Payload::Reason(reason));
        Error::AssociationFailure(reason)
    }

    fn poll_attempt(&mut self, ctx: &mut Context<'_>) {
        match self.wifi.status() {
            LinkStatus::Connected => {
                info!("Wifi: associated with '{}'", self.network.wifi_ssid);
                self.state = AssociationState::Associated;
                self.backoff.reset();
                ctx.set_period(self.timing.associated_poll_ms);
                ctx.signal(EventKind::WifiConnected);
            }
            LinkStatus::NoSsid => {
                self.fail(ctx, REASON_NO_SSID);
            }
            LinkStatus::Failed => {
                self.fail(ctx, REASON_FAILED);
            }
            _ => {
                let waited = ctx.now_ms().saturating_sub(self.attempt_started_ms);
                if waited > self.timing.association_timeout_ms {
                    self.wifi.disconnect();
                    self.fail(ctx, REASON_TIMEOUT);
                }
            }
        }
    }
}

fn format_bssid(bssid: &[u8; 6]) -> String {
    bssid
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect::<Vec<_>>()
        .join(":")
}

impl<W: WifiDriver> EventHandler for AssociationTask<W> {
    fn handle_event(&mut self, _event: &Event, _ctx: &mut Context<'_>) {}
}

impl<W: WifiDriver> Task for AssociationTask<W> {
    fn name(&self) -> &'static str {
        "Wifi"
    }

    fn on_enable(&mut self, ctx: &mut Context<'_>) -> bool {
        self.wifi.disconnect();
        self.state = AssociationState::Unassociated;
        // A failed first attempt has already set the retry period.
        let _ = self.connect(ctx);
        true
    }

    fn step(&mut self, ctx: &mut Context<'_>) {
        match self.state {
            AssociationState::Associating => self.poll_attempt(ctx),
            AssociationState::Associated => {
                if self.wifi.status() != LinkStatus::Connected {
                    warn!("Wifi: link lost");
                    self.state = AssociationState::Unassociated;
                    self.backoff.reset();
                    ctx.signal(EventKind::WifiDisconnected);
                    let _ = self.connect(ctx);
                }
            }
            AssociationState::Unassociated => {
                let _ = self.connect(ctx);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sim::{EventRecorder, SimWifi};
    use crate::scheduler::{Scheduler, TaskId};

    fn network() -> NetworkConfig {
        NetworkConfig {
            wifi_ssid: heapless::String::try_from("eduroam").unwrap(),
            wifi_user: "user@lab".into(),
            wifi_pass: "pw".into(),
            mqtt_server: "broker".into(),
            mqtt_port: 1883,
        }
    }

    fn setup(wifi: &SimWifi) -> (Scheduler, TaskId, crate::adapters::sim::RecordedEvents) {
        let mut sched = Scheduler::new();
        let (recorder, events) = EventRecorder::new();
        let rec = sched.register(Box::new(recorder), 1000);
        sched.subscribe(rec);
        let task = AssociationTask::new(wifi.clone(), network(), NetworkTiming::default());
        let id = sched.register(Box::new(task), 1000);
        sched.enable(id);
        (sched, id, events)
    }

    #[test]
    fn backoff_doubles_to_cap() {
        let mut b = Backoff::new(60_000, 300_000);
        let delays: Vec<u64> = (0..5).map(|_| b.next_delay()).collect();
        assert_eq!(delays, vec![60_000, 120_000, 240_000, 300_000, 300_000]);
        b.reset();
        assert_eq!(b.peek(), 60_000);
    }

    #[test]
    fn strongest_matching_ap_wins() {
        let wifi = SimWifi::new();
        wifi.add_ap("eduroam", 1, -70);
        wifi.add_ap("other", 2, -20);
        wifi.add_ap("eduroam", 3, -40);
        let (mut sched, _, events) = setup(&wifi);
        sched.tick(0);
        assert_eq!(wifi.joined(), vec![[0, 0, 0, 0, 0, 3]]);
        assert_eq!(events.kinds(), vec![EventKind::WifiConnecting]);
    }

    #[test]
    fn equal_rssi_keeps_first_scanned() {
        let wifi = SimWifi::new();
        wifi.add_ap("eduroam", 7, -50);
        wifi.add_ap("eduroam", 8, -50);
        let aps = wifi.scan_results();
        let best = AssociationTask::<SimWifi>::strongest(&aps, "eduroam").unwrap();
        assert_eq!(best.bssid[5], 7);
    }

    #[test]
    fn no_matching_ap_fails_and_backs_off() {
        let wifi = SimWifi::new();
        wifi.add_ap("guest", 1, -30);
        let (mut sched, id, events) = setup(&wifi);
        sched.tick(0);
        assert_eq!(events.payloads(EventKind::WifiConnectFailed), vec![Payload::Reason(REASON_NOT_DETECTABLE)]);
        assert_eq!(sched.period_ms(id), 60_000);
        assert!(wifi.joined().is_empty());

        // Not retried before the deadline.
        sched.tick(30_000);
        assert_eq!(events.count(EventKind::WifiConnectFailed), 1);

        sched.tick(60_000);
        assert_eq!(events.count(EventKind::WifiConnectFailed), 2);
        assert_eq!(sched.period_ms(id), 120_000);
    }

    #[test]
    fn first_poll_waits_one_associating_period() {
        let wifi = SimWifi::new();
        wifi.add_ap("eduroam", 1, -60);
        let (mut sched, id, events) = setup(&wifi);
        sched.tick(0);
        assert_eq!(sched.steps(id), 0);
        wifi.set_status(LinkStatus::Connected);
        sched.tick(99);
        assert_eq!(events.count(EventKind::WifiConnected), 0);
        sched.tick(100);
        assert_eq!(events.count(EventKind::WifiConnected), 1);
    }

    #[test]
    fn link_up_resets_backoff_and_slows_poll() {
        let wifi = SimWifi::new();
        let (mut sched, id, events) = setup(&wifi);
        sched.tick(0);
        assert_eq!(sched.period_ms(id), 60_000);

        wifi.add_ap("eduroam", 1, -60);
        sched.tick(60_000);
        assert_eq!(sched.period_ms(id), 100);
        wifi.set_status(LinkStatus::Connected);
        sched.tick(60_100);
        assert_eq!(sched.period_ms(id), 1000);
        assert_eq!(events.count(EventKind::WifiConnected), 1);
    }

    #[test]
    fn attempt_times_out() {
        let wifi = SimWifi::new();
        wifi.add_ap("eduroam", 1, -60);
        let (mut sched, id, events) = setup(&wifi);
        sched.tick(0);
        let mut now = 0;
        while now <= 30_000 {
            now += 100;
            sched.tick(now);
        }
        assert_eq!(events.payloads(EventKind::WifiConnectFailed), vec![Payload::Reason(REASON_TIMEOUT)]);
        assert_eq!(sched.period_ms(id), 60_000);
    }

    #[test]
    fn explicit_failures_are_named() {
        for (status, reason) in [(LinkStatus::NoSsid, REASON_NO_SSID), (LinkStatus::Failed, REASON_FAILED)] {
            let wifi = SimWifi::new();
            wifi.add_ap("eduroam", 1, -60);
            let (mut sched, _, events) = setup(&wifi);
            sched.tick(0);
            wifi.set_status(status);
            sched.tick(100);
            assert_eq!(events.payloads(EventKind::WifiConnectFailed), vec![Payload::Reason(reason)]);
        }
    }

    #[test]
    fn lost_link_reconnects_immediately() {
        let wifi = SimWifi::new();
        wifi.add_ap("eduroam", 1, -60);
        let (mut sched, _, events) = setup(&wifi);
        sched.tick(0);
        wifi.set_status(LinkStatus::Connected);
        sched.tick(100);
        wifi.set_status(LinkStatus::Disconnected);
        sched.tick(1100);
        assert_eq!(
            events.kinds(),
            vec![
                EventKind::WifiConnecting,
                EventKind::WifiConnected,
                EventKind::WifiDisconnected,
                EventKind::WifiConnecting,
            ]
        );
        assert_eq!(wifi.joined().len(), 2);
    }

    #[test]
    fn activation_drops_stale_link() {
        let wifi = SimWifi::new();
        let (mut sched, _, _) = setup(&wifi);
        sched.tick(0);
        assert_eq!(wifi.disconnects(), 1);
    }

    struct Shutdown(AssociationTask<SimWifi>);

    impl EventHandler for Shutdown {
        fn handle_event(&mut self, _event: &Event, _ctx: &mut Context<'_>) {}
    }

    impl Task for Shutdown {
        fn name(&self) -> &'static str {
            "shutdown"
        }

        fn on_enable(&mut self, ctx: &mut Context<'_>) -> bool {
            self.0.on_enable(ctx)
        }

        fn step(&mut self, ctx: &mut Context<'_>) {
            if self.0.state() == AssociationState::Associated {
                self.0.disconnect(ctx);
            } else {
                self.0.step(ctx);
            }
        }
    }

    #[test]
    fn disconnect_self_disables_and_reports_once() {
        let wifi = SimWifi::new();
        wifi.add_ap("eduroam", 1, -60);
        let mut sched = Scheduler::new();
        let (recorder, events) = EventRecorder::new();
        let rec = sched.register(Box::new(recorder), 1000);
        sched.subscribe(rec);
        let task = AssociationTask::new(wifi.clone(), network(), NetworkTiming::default());
        let id = sched.register(Box::new(Shutdown(task)), 1000);
        sched.enable(id);

        sched.tick(0);
        wifi.set_status(LinkStatus::Connected);
        sched.tick(100);
        sched.tick(1100);
        assert!(!sched.is_enabled(id));
        assert_eq!(events.count(EventKind::WifiDisconnected), 1);
        assert_eq!(wifi.disconnects(), 2);
    }
}

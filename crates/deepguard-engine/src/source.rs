use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use deepguard_core::events::DiscoveryEvent;
use deepguard_core::media::{MediaDescriptor, MediaKind, PlaybackState};

/// Cadence of the periodic sweep that catches lazy-loaded images.
pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Delay before the first sweep, giving the page time to settle.
pub const INITIAL_SWEEP_DELAY: Duration = Duration::from_secs(2);

/// A media element as reported by the host's page scanner.
#[derive(Clone, Debug)]
pub struct PageItem {
    pub desc: MediaDescriptor,
    pub playback: Option<PlaybackState>,
}

/// Host-side snapshot of the page's media elements. Implementations walk
/// the live document; elements already processed may be reported again on
/// every call.
pub trait PageScanner: Send + Sync {
    fn media(&self) -> Vec<PageItem>;
}

/// Converts a `PageScanner` into a `DiscoveryEvent` stream.
///
/// Sweeps run after an initial settle delay, then on a fixed interval, and
/// immediately whenever the host signals a DOM mutation or a settled
/// scroll through `notifier()`.
pub struct PollDriver {
    scanner: Arc<dyn PageScanner>,
    notify: Arc<Notify>,
    cancel: CancellationToken,
}

impl PollDriver {
    pub fn new(scanner: Arc<dyn PageScanner>) -> Self {
        Self {
            scanner,
            notify: Arc::new(Notify::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Handle the host pings on mutations and scroll settles.
    pub fn notifier(&self) -> Arc<Notify> {
        Arc::clone(&self.notify)
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn spawn(self, tx: mpsc::Sender<DiscoveryEvent>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(tx).await })
    }

    async fn run(self, tx: mpsc::Sender<DiscoveryEvent>) {
        tokio::select! {
            _ = self.cancel.cancelled() => return,
            _ = tokio::time::sleep(INITIAL_SWEEP_DELAY) => {}
        }
        if self.sweep(&tx).await.is_err() {
            return;
        }

        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await; // the immediate first tick; the sweep above covered it

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
                _ = self.notify.notified() => {}
            }
            if self.sweep(&tx).await.is_err() {
                break;
            }
        }
        debug!("poll driver stopped");
    }

    /// Emit one event per reported element; ended videos additionally get
    /// a `PlaybackEnded` so their controllers tear down.
    async fn sweep(&self, tx: &mpsc::Sender<DiscoveryEvent>) -> Result<(), ()> {
        for item in self.scanner.media() {
            let id = item.desc.id.clone();
            let ended = item.playback.map(|p| p.ended).unwrap_or(false);

            let event = match item.desc.kind {
                MediaKind::Video => DiscoveryEvent::VideoSeen {
                    playback: item.playback.unwrap_or_default(),
                    desc: item.desc,
                },
                MediaKind::Image => DiscoveryEvent::ImageSeen { desc: item.desc },
            };

            if tx.send(event).await.is_err() {
                return Err(()); // engine gone
            }
            if ended && tx.send(DiscoveryEvent::PlaybackEnded { id }).await.is_err() {
                return Err(());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{image_descriptor, playing, video_descriptor, StaticPage};
    use deepguard_core::ids::ElementId;

    fn drain(rx: &mut mpsc::Receiver<DiscoveryEvent>) -> Vec<DiscoveryEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn nothing_before_initial_delay() {
        tokio::time::pause();
        let page = Arc::new(StaticPage::new(vec![PageItem {
            desc: image_descriptor(&ElementId::new()),
            playback: None,
        }]));
        let driver = PollDriver::new(page);
        let (tx, mut rx) = mpsc::channel(16);
        let _handle = driver.spawn(tx);

        tokio::time::sleep(Duration::from_millis(500)).await;
        tokio::task::yield_now().await;
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn initial_sweep_emits_items() {
        tokio::time::pause();
        let page = Arc::new(StaticPage::new(vec![PageItem {
            desc: image_descriptor(&ElementId::new()),
            playback: None,
        }]));
        let driver = PollDriver::new(page);
        let (tx, mut rx) = mpsc::channel(16);
        let _handle = driver.spawn(tx);

        tokio::time::sleep(INITIAL_SWEEP_DELAY + Duration::from_millis(10)).await;
        tokio::task::yield_now().await;

        let events = drain(&mut rx);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], DiscoveryEvent::ImageSeen { .. }));
    }

    #[tokio::test]
    async fn periodic_sweeps_reemit() {
        tokio::time::pause();
        let page = Arc::new(StaticPage::new(vec![PageItem {
            desc: image_descriptor(&ElementId::new()),
            playback: None,
        }]));
        let driver = PollDriver::new(page);
        let (tx, mut rx) = mpsc::channel(16);
        let _handle = driver.spawn(tx);

        tokio::time::sleep(INITIAL_SWEEP_DELAY + Duration::from_millis(10)).await;
        tokio::task::yield_now().await;
        assert_eq!(drain(&mut rx).len(), 1);

        tokio::time::sleep(POLL_INTERVAL).await;
        tokio::task::yield_now().await;
        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[tokio::test]
    async fn notify_triggers_immediate_sweep() {
        tokio::time::pause();
        let page = Arc::new(StaticPage::new(vec![PageItem {
            desc: image_descriptor(&ElementId::new()),
            playback: None,
        }]));
        let driver = PollDriver::new(page);
        let notifier = driver.notifier();
        let (tx, mut rx) = mpsc::channel(16);
        let _handle = driver.spawn(tx);

        tokio::time::sleep(INITIAL_SWEEP_DELAY + Duration::from_millis(10)).await;
        tokio::task::yield_now().await;
        drain(&mut rx);

        // well before the next interval tick
        tokio::time::sleep(Duration::from_millis(100)).await;
        notifier.notify_one();
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        assert_eq!(drain(&mut rx).len(), 1);
    }

    #[tokio::test]
    async fn ended_video_gets_playback_ended() {
        tokio::time::pause();
        let id = ElementId::new();
        let page = Arc::new(StaticPage::new(vec![PageItem {
            desc: video_descriptor(&id),
            playback: Some(PlaybackState {
                ended: true,
                ..playing()
            }),
        }]));
        let driver = PollDriver::new(page);
        let (tx, mut rx) = mpsc::channel(16);
        let _handle = driver.spawn(tx);

        tokio::time::sleep(INITIAL_SWEEP_DELAY + Duration::from_millis(10)).await;
        tokio::task::yield_now().await;

        let events = drain(&mut rx);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], DiscoveryEvent::VideoSeen { .. }));
        assert!(
            matches!(&events[1], DiscoveryEvent::PlaybackEnded { id: ended } if *ended == id)
        );
    }

    #[tokio::test]
    async fn cancel_stops_sweeping() {
        tokio::time::pause();
        let page = Arc::new(StaticPage::new(vec![PageItem {
            desc: image_descriptor(&ElementId::new()),
            playback: None,
        }]));
        let driver = PollDriver::new(page);
        let cancel = driver.cancel_token();
        let (tx, mut rx) = mpsc::channel(16);
        let handle = driver.spawn(tx);

        tokio::time::sleep(INITIAL_SWEEP_DELAY + Duration::from_millis(10)).await;
        tokio::task::yield_now().await;
        drain(&mut rx);

        cancel.cancel();
        tokio::task::yield_now().await;

        tokio::time::sleep(POLL_INTERVAL * 3).await;
        tokio::task::yield_now().await;
        assert!(drain(&mut rx).is_empty());
        assert!(handle.is_finished());
    }
}

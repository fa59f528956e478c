//! Key-rotation scheduling.
//!
//! Three pieces run around every outgoing packet, in order: `manage_km`
//! pre-announces the next key once the active one nears its packet
//! budget (and arms the periodic re-announce timer), `pending_km`
//! collects the KM records due for emission, and `rotate_if_due` flips
//! the active slot after the budget is spent. Announcement works by
//! repetition across the announce window, not acknowledgment: the peer
//! sees the next key at least `km_pre_announce` packets before it
//! carries traffic.

use std::time::Instant;

use bytes::Bytes;

use crate::context::ContextStatus;
use crate::errors::SessionError;
use crate::session::Session;

impl Session {
    /// Pre-announce rule and re-announce timer, evaluated against the
    /// active context before a packet is encrypted.
    ///
    /// When the active context is within `km_pre_announce` packets of
    /// its budget and the alternate slot is idle or decommissioned, the
    /// alternate is rekeyed, its KM record rebuilt, and its announcement
    /// started. Separately, once `km_tx_period` has elapsed since the
    /// last emission the active context is flagged for re-announcement.
    pub(crate) fn manage_km(&mut self, now: Instant) -> Result<(), SessionError> {
        let active = self.active_slot()?;
        let alternate = Self::alternate(active);

        let refresh = u64::from(self.config.km_refresh_rate);
        let pre_announce = u64::from(self.config.km_pre_announce);
        let count = self.contexts[active].packet_count();

        if count + pre_announce >= refresh
            && matches!(
                self.contexts[alternate].status(),
                ContextStatus::Idle | ContextStatus::Decommissioned
            )
        {
            self.rekey_slot(alternate)?;
            self.contexts[alternate].mark_announced();
            tracing::debug!(
                parity = ?self.contexts[alternate].parity(),
                active_packets = count,
                "Announcing next key ahead of rotation"
            );
        }

        if self.km_timer_due(now) {
            self.contexts[active].set_time_to_send(true);
        }
        Ok(())
    }

    fn km_timer_due(&self, now: Instant) -> bool {
        let period = self.config.km_tx_period;
        if period.is_zero() {
            return false;
        }
        self.last_km_sent.is_none_or(|at| now.duration_since(at) >= period)
    }

    /// Drains due KM emissions, active slot first, stopping at
    /// `max_out`. Emission flags survive on slots the cap excluded, so
    /// a deferred record is emitted on a later call rather than lost.
    pub(crate) fn pending_km(&mut self, now: Instant, max_out: usize) -> Vec<Bytes> {
        let mut out = Vec::new();
        let Some(active) = self.active else {
            return out;
        };

        for slot in [active, Self::alternate(active)] {
            if out.len() >= max_out {
                break;
            }
            let ctx = &mut self.contexts[slot];
            let due = match ctx.status() {
                ContextStatus::Active | ContextStatus::Announced => {
                    ctx.announce_pending() || ctx.time_to_send()
                }
                _ => false,
            };
            if !due || ctx.encoded_km().is_empty() {
                continue;
            }

            out.push(Bytes::copy_from_slice(ctx.encoded_km()));
            ctx.set_time_to_send(false);
            // An announced alternate repeats until it is promoted; the
            // active record is one-shot until the timer re-arms it.
            if ctx.status() == ContextStatus::Active {
                ctx.set_announce_pending(false);
            }
        }

        if !out.is_empty() {
            self.last_km_sent = Some(now);
        }
        out
    }

    /// Post-encrypt rotation check: once the active context's packet
    /// budget is spent, the alternate takes over and the old key is
    /// decommissioned (retained for in-flight packets until the slot is
    /// recycled by a later rekey).
    pub(crate) fn rotate_if_due(&mut self) -> Result<(), SessionError> {
        let Some(active) = self.active else {
            return Ok(());
        };
        if self.contexts[active].packet_count() < u64::from(self.config.km_refresh_rate) {
            return Ok(());
        }

        let alternate = Self::alternate(active);
        if self.contexts[alternate].status() != ContextStatus::Announced {
            // Zero pre-announce (or a missed window): key the alternate
            // now so the switch still happens on time.
            self.rekey_slot(alternate)?;
            self.contexts[alternate].mark_announced();
        }
        self.promote(alternate);
        Ok(())
    }

    fn promote(&mut self, slot: usize) {
        debug_assert_eq!(self.contexts[slot].status(), ContextStatus::Announced);
        let retired = Self::alternate(slot);
        self.contexts[slot].activate();
        self.contexts[slot].set_announce_pending(false);
        self.contexts[retired].decommission();
        self.active = Some(slot);
        tracing::info!(
            parity = ?self.contexts[slot].parity(),
            retired = ?self.contexts[retired].parity(),
            packets = self.contexts[retired].packet_count(),
            "Rotated active key"
        );
    }
}

// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Expiry sweeping for sessions, pairings, proposals and resolved RPC records.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::context::EngineContext;
use super::pairing_engine::PairingEngine;
use crate::api::{SignEvent, SignResult};

/// What a sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub sessions: usize,
    pub pairings: usize,
    pub proposals: usize,
    /// Own proposals the peer never answered.
    pub sent_proposals: usize,
    /// Settlements the wallet never completed.
    pub settlements: usize,
    /// Resolved RPC records past the retention window.
    pub history: usize,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        *self == SweepReport::default()
    }
}

pub(crate) struct ExpirySweeper {
    ctx: Arc<EngineContext>,
    pairing: Arc<PairingEngine>,
}

impl ExpirySweeper {
    pub fn new(ctx: Arc<EngineContext>, pairing: Arc<PairingEngine>) -> Arc<Self> {
        Arc::new(ExpirySweeper { ctx, pairing })
    }

    /// Removes every record past its expiry and reports one event each.
    pub async fn sweep(&self) -> SignResult<SweepReport> {
        let now = self.ctx.now();
        let mut report = SweepReport::default();

        for session in self.ctx.sessions.all()? {
            if !session.is_expired(now) {
                continue;
            }
            self.ctx.teardown_session(&session).await;
            report.sessions += 1;
            self.ctx.emit(SignEvent::SessionExpired {
                topic: session.topic,
            });
        }

        for pairing in self.ctx.pairings.all()? {
            if !pairing.is_expired(now) {
                continue;
            }
            self.pairing.discard(&pairing.topic).await;
            report.pairings += 1;
            self.ctx.emit(SignEvent::PairingExpired {
                topic: pairing.topic,
            });
        }

        for proposal in self.ctx.proposals.all()? {
            if !proposal.is_expired(now) {
                continue;
            }
            let proposer_public_key = proposal.proposer_public_key();
            self.ctx.proposals.delete(&proposer_public_key)?;
            if let Err(e) = self.ctx.verify_contexts.delete(proposal.id) {
                warn!(id = %proposal.id, error = %e, "failed to delete verify context");
            }
            report.proposals += 1;
            self.ctx.emit(SignEvent::ProposalExpired {
                pairing_topic: proposal.pairing_topic,
                proposer_public_key,
            });
        }

        for proposal in self.ctx.proposals.all_sent()? {
            if !proposal.is_expired(now) {
                continue;
            }
            let proposer_public_key = proposal.proposer_public_key();
            self.ctx.proposals.delete_sent(&proposer_public_key)?;
            if let Err(e) = self.ctx.kms.delete_private_key(&proposer_public_key) {
                warn!(id = %proposal.id, error = %e, "failed to delete proposer key");
            }
            self.ctx.interactor.history().delete(proposal.id);
            report.sent_proposals += 1;
            self.ctx.emit(SignEvent::ProposalExpired {
                pairing_topic: proposal.pairing_topic,
                proposer_public_key,
            });
        }

        for (topic, proposal) in self.ctx.proposals.all_pending_settlements()? {
            if !proposal.is_expired(now) {
                continue;
            }
            self.ctx.proposals.delete_pending_settlement(&topic)?;
            self.ctx.teardown_topic(&topic).await;
            if let Err(e) = self
                .ctx
                .kms
                .delete_private_key(&proposal.proposer_public_key())
            {
                warn!(topic = %topic, error = %e, "failed to delete proposer key");
            }
            report.settlements += 1;
        }

        report.history = self
            .ctx
            .interactor
            .history()
            .prune_resolved(self.ctx.ttl.history);

        if report.is_empty() {
            debug!("expiry sweep found nothing");
        } else {
            info!(
                sessions = report.sessions,
                pairings = report.pairings,
                proposals = report.proposals,
                sent_proposals = report.sent_proposals,
                settlements = report.settlements,
                history = report.history,
                "expired records removed"
            );
        }
        Ok(report)
    }

    /// Sweeps every `interval` until the sweeper is dropped.
    pub fn spawn(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let sweeper = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(sweeper) = sweeper.upgrade() else {
                    break;
                };
                if let Err(e) = sweeper.sweep().await {
                    warn!(error = %e, "expiry sweep failed");
                }
            }
        })
    }
}

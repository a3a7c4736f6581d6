//! Squire: grants privilege modes to friends and revokes them from foes.
//!
//! The rule set is a friend/foe partition of the `squire_hostmasks` table,
//! replaced wholesale whenever it is reloaded. Every observed user (a join,
//! a channel message, a resolved hostmask, or a full scan) is run through
//! [`RuleSet::evaluate`] and the resulting mode changes are sent as `MODE`
//! commands. Bans that cover an administrator are lifted again.

mod commands;

use super::Plugin;
use crate::auth::Authorizer;
use crate::bot::BotContext;
use crate::client::casemap::irc_eq;
use crate::error::PluginError;
use crate::events::{ActionableEvent, BotEvent, EventKind};
use crate::mask;
use crate::state::HostmaskEntry;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info, trace};

pub const PLUGIN_ID: &str = "squire";

/// Mode checked for subjects with no friend entry. Nobody ever holds it, so
/// non-friends always pass the "already has the mode" guard and get
/// evaluated for revocation instead.
const NOT_GRANTED: char = '+';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Grant,
    Revoke,
}

impl Direction {
    fn sign(self) -> char {
        match self {
            Self::Grant => '+',
            Self::Revoke => '-',
        }
    }
}

/// A mode change the engine considered for one subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpgradeDecision {
    pub should_act: bool,
    pub mode: char,
    pub direction: Direction,
}

impl UpgradeDecision {
    /// `+o` / `-v` style argument for `MODE`.
    pub fn change(&self) -> String {
        format!("{}{}", self.direction.sign(), self.mode)
    }
}

/// Friend and foe hostmask patterns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    friends: Vec<HostmaskEntry>,
    foes: Vec<HostmaskEntry>,
}

impl RuleSet {
    /// Split entries by classification, keeping row order within each set.
    pub fn partition(entries: Vec<HostmaskEntry>) -> Self {
        let (friends, foes) = entries.into_iter().partition(|e| e.is_friend);
        Self { friends, foes }
    }

    pub fn friends(&self) -> &[HostmaskEntry] {
        &self.friends
    }

    pub fn foes(&self) -> &[HostmaskEntry] {
        &self.foes
    }

    /// Mode of the first friend pattern matching `hostmask`.
    pub fn friend_mode(&self, hostmask: &str) -> Option<char> {
        first_match(&self.friends, hostmask)
    }

    /// Mode of the first foe pattern matching `hostmask`.
    pub fn foe_mode(&self, hostmask: &str) -> Option<char> {
        first_match(&self.foes, hostmask)
    }

    /// Friend by pattern, or an administrator.
    pub fn is_friend(&self, hostmask: &str, authorizer: &dyn Authorizer) -> bool {
        mask::match_any(hostmask, self.friends.iter().map(|e| e.pattern.as_str()))
            || authorizer.is_admin(hostmask)
    }

    pub fn is_foe(&self, hostmask: &str) -> bool {
        mask::match_any(hostmask, self.foes.iter().map(|e| e.pattern.as_str()))
    }

    /// Whether `subject` is worth acting on at all.
    ///
    /// Requires a known hostmask, operator privileges for the bot in the
    /// channel, and that the subject does not already hold the mode a friend
    /// entry would grant.
    pub fn is_upgradeable(&self, subject: &ActionableEvent, bot_has_ops: bool) -> bool {
        let Some(hostmask) = subject.hostmask.as_deref() else {
            return false;
        };
        let mode = self.friend_mode(hostmask).unwrap_or(NOT_GRANTED);
        bot_has_ops && !subject.modes.has(mode)
    }

    /// Mode changes for `subject`. Friend and foe matches are evaluated
    /// independently.
    pub fn evaluate(
        &self,
        subject: &ActionableEvent,
        bot_has_ops: bool,
        authorizer: &dyn Authorizer,
    ) -> Vec<UpgradeDecision> {
        let mut decisions = Vec::new();
        if !self.is_upgradeable(subject, bot_has_ops) {
            return decisions;
        }
        let Some(hostmask) = subject.hostmask.as_deref() else {
            return decisions;
        };

        if let Some(mode) = self.friend_mode(hostmask)
            && self.is_friend(hostmask, authorizer)
        {
            decisions.push(UpgradeDecision {
                should_act: !subject.modes.has(mode),
                mode,
                direction: Direction::Grant,
            });
        }

        if let Some(mode) = self.foe_mode(hostmask) {
            decisions.push(UpgradeDecision {
                should_act: subject.modes.has(mode),
                mode,
                direction: Direction::Revoke,
            });
        }

        decisions
    }
}

fn first_match(entries: &[HostmaskEntry], hostmask: &str) -> Option<char> {
    entries
        .iter()
        .find(|e| mask::matches(hostmask, &e.pattern))
        .map(|e| e.mode)
}

/// The permission engine plugin.
pub struct Squire {
    rules: RwLock<Arc<RuleSet>>,
}

impl Default for Squire {
    fn default() -> Self {
        Self::new()
    }
}

impl Squire {
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(Arc::new(RuleSet::default())),
        }
    }

    pub fn rules(&self) -> Arc<RuleSet> {
        self.rules.read().clone()
    }

    /// Reload the rule set from the store. The old set stays on failure.
    pub async fn refresh(&self, ctx: &BotContext) -> Result<(), PluginError> {
        let entries = ctx.store.load_hostmasks().await?;
        let rules = RuleSet::partition(entries);
        info!(
            friends = rules.friends.len(),
            foes = rules.foes.len(),
            "Hostmask rules loaded"
        );
        *self.rules.write() = Arc::new(rules);
        Ok(())
    }

    /// Re-evaluate every known member of every in-scope channel.
    pub async fn scan(&self, ctx: &BotContext) -> Result<(), PluginError> {
        self.scan_except(ctx, None).await
    }

    /// Scan, leaving out `(channel, nick)`, whose grant is already on its way.
    async fn scan_except(
        &self,
        ctx: &BotContext,
        granted: Option<(&str, &str)>,
    ) -> Result<(), PluginError> {
        let subjects = ctx.tracker.subjects();
        debug!(subjects = subjects.len(), "Scanning channel members");

        for subject in subjects {
            if granted.is_some_and(|(channel, nick)| {
                irc_eq(&subject.channel, channel) && irc_eq(&subject.nick, nick)
            }) {
                continue;
            }
            self.act_on(ctx, &subject).await?;
        }
        Ok(())
    }

    /// Evaluate one subject and send whatever mode changes it needs.
    ///
    /// Channels outside the plugin's scope are left alone.
    pub async fn act_on(&self, ctx: &BotContext, subject: &ActionableEvent) -> Result<(), PluginError> {
        if !in_scope(ctx, &subject.channel) {
            trace!(channel = %subject.channel, "Channel out of scope");
            return Ok(());
        }

        let bot_has_ops = ctx.tracker.bot_has_ops(&subject.channel);
        let decisions = self
            .rules()
            .evaluate(subject, bot_has_ops, ctx.authorizer.as_ref());

        if decisions.is_empty() {
            debug!(nick = %subject.nick, channel = %subject.channel, "Not upgradeable");
            return Ok(());
        }

        for decision in decisions.into_iter().filter(|d| d.should_act) {
            let change = decision.change();
            info!(
                nick = %subject.nick,
                channel = %subject.channel,
                mode = %change,
                "Setting member mode"
            );
            ctx.client.mode(&subject.channel, &change, &subject.nick).await?;
        }
        Ok(())
    }

    /// Lift a ban in `channel` whose mask covers an administrator.
    pub async fn lift_admin_ban(
        &self,
        ctx: &BotContext,
        channel: &str,
        ban: &str,
    ) -> Result<(), PluginError> {
        if !in_scope(ctx, channel) {
            return Ok(());
        }

        let covers_admin = ctx.authorizer.is_admin(ban)
            || ctx
                .tracker
                .hostmasks_in(channel)
                .iter()
                .any(|h| mask::matches(h, ban) && ctx.authorizer.is_admin(h));
        if !covers_admin {
            return Ok(());
        }
        if !ctx.tracker.bot_has_ops(channel) {
            debug!(channel = %channel, mask = %ban, "Administrator banned but no ops to lift it");
            return Ok(());
        }

        info!(channel = %channel, mask = %ban, "Lifting ban on administrator");
        ctx.client.mode(channel, "-b", ban).await?;
        Ok(())
    }
}

/// Whether squire is enabled in `channel`, read from the live plugin map.
fn in_scope(ctx: &BotContext, channel: &str) -> bool {
    ctx.config
        .snapshot()
        .plugin(PLUGIN_ID)
        .is_some_and(|r| r.in_scope(channel))
}

#[async_trait]
impl Plugin for Squire {
    fn id(&self) -> &'static str {
        PLUGIN_ID
    }

    fn interests(&self) -> &'static [EventKind] {
        &[
            EventKind::Join,
            EventKind::ActionableMessage,
            EventKind::AddressedCommand,
            EventKind::HostmaskUpdated,
            EventKind::AllHostmasksProcessed,
            EventKind::BanAdded,
            EventKind::Tick,
        ]
    }

    async fn init(&self, ctx: &BotContext) -> Result<(), PluginError> {
        self.refresh(ctx).await?;
        self.scan(ctx).await
    }

    async fn handle(&self, ctx: &BotContext, event: &BotEvent) -> Result<(), PluginError> {
        match event {
            BotEvent::Join { .. } | BotEvent::AllHostmasksProcessed | BotEvent::Tick => {
                self.scan(ctx).await
            }
            BotEvent::ActionableMessage(subject) => self.act_on(ctx, subject).await,
            BotEvent::HostmaskUpdated {
                nick,
                hostmask,
                channels,
            } => {
                for channel in channels {
                    let Some(mut subject) = ctx.tracker.subject(channel, nick) else {
                        continue;
                    };
                    subject.hostmask = Some(hostmask.clone());
                    self.act_on(ctx, &subject).await?;
                }
                Ok(())
            }
            BotEvent::BanAdded { channel, mask } => self.lift_admin_ban(ctx, channel, mask).await,
            BotEvent::AddressedCommand(cmd) => commands::handle(self, ctx, cmd).await,
        }
    }
}

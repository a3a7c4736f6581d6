//! Administrator commands: `af`, `rf`, `if`, `scan`.

use super::Squire;
use crate::bot::BotContext;
use crate::error::PluginError;
use crate::events::CommandEvent;
use crate::state::parse_mode;
use tracing::{info, warn};

/// Generic failure reply.
const ERROR_REPLY: &str = "error lol";

pub(super) async fn handle(
    squire: &Squire,
    ctx: &BotContext,
    cmd: &CommandEvent,
) -> Result<(), PluginError> {
    if !matches!(cmd.command.as_str(), "af" | "rf" | "if" | "scan") {
        return Ok(());
    }
    if !ctx.authorizer.authorize(cmd.hostmask.as_deref()) {
        return Err(PluginError::AuthorizationDenied);
    }

    let result = match cmd.command.as_str() {
        "af" => add_friend(squire, ctx, cmd).await,
        "rf" => remove_friend(squire, ctx, cmd).await,
        "if" => is_friend(squire, ctx, cmd).await,
        _ => {
            squire.scan(ctx).await?;
            ctx.client.say(&cmd.channel, "scanning!").await?;
            Ok(())
        }
    };

    match result {
        Err(PluginError::UnresolvedNick(nick)) => {
            warn!(command = %cmd.command, nick = %nick, "No hostmask known for target");
            ctx.client.say(&cmd.channel, ERROR_REPLY).await?;
            Ok(())
        }
        Err(PluginError::Store(e)) => {
            warn!(command = %cmd.command, error = %e, code = e.error_code(), "Roster update failed");
            ctx.client
                .say(&cmd.channel, &format!("{}: {}", ERROR_REPLY, e))
                .await?;
            Ok(())
        }
        other => other,
    }
}

/// Nick named by the first argument and its known hostmask.
fn resolve_target<'a>(ctx: &BotContext, cmd: &'a CommandEvent) -> Result<(&'a str, String), PluginError> {
    let nick = cmd
        .arg(0)
        .ok_or_else(|| PluginError::UnresolvedNick(String::new()))?;
    let hostmask = ctx
        .tracker
        .hostmask_of(nick)
        .ok_or_else(|| PluginError::UnresolvedNick(nick.to_string()))?;
    Ok((nick, hostmask))
}

/// `af <nick> [mode]`: grant now, persist, then reload the rules and rescan.
///
/// The rescan skips the new friend in this channel; the grant is already sent.
async fn add_friend(squire: &Squire, ctx: &BotContext, cmd: &CommandEvent) -> Result<(), PluginError> {
    let (nick, hostmask) = resolve_target(ctx, cmd)?;
    let mode = cmd
        .arg(1)
        .and_then(parse_mode)
        .unwrap_or(ctx.default_friend_mode);

    ctx.client
        .mode(&cmd.channel, &format!("+{}", mode), nick)
        .await?;
    ctx.store.add_friend(&hostmask, mode, nick).await?;
    info!(admin = %cmd.nick, hostmask = %hostmask, mode = %mode, "Friend added");

    squire.refresh(ctx).await?;
    squire
        .scan_except(ctx, Some((cmd.channel.as_str(), nick)))
        .await
}

/// `rf <nick>`: soft-disable the entry, then reload the rules and rescan.
///
/// The mode already granted is left alone.
async fn remove_friend(squire: &Squire, ctx: &BotContext, cmd: &CommandEvent) -> Result<(), PluginError> {
    let (_, hostmask) = resolve_target(ctx, cmd)?;

    ctx.store.disable_friend(&hostmask).await?;
    info!(admin = %cmd.nick, hostmask = %hostmask, "Friend removed");

    squire.refresh(ctx).await?;
    squire.scan(ctx).await
}

/// `if <nick>`: answer `yes` or `no`.
async fn is_friend(squire: &Squire, ctx: &BotContext, cmd: &CommandEvent) -> Result<(), PluginError> {
    let (_, hostmask) = resolve_target(ctx, cmd)?;
    let answer = if squire.rules().is_friend(&hostmask, ctx.authorizer.as_ref()) {
        "yes"
    } else {
        "no"
    };
    ctx.client.say(&cmd.channel, answer).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::testing::{ADMIN_HOSTMASK, FakeStore, create_test_context, drain};
    use crate::client::ClientEvent;
    use crate::plugins::Plugin;
    use crate::plugins::squire::PLUGIN_ID;
    use crate::state::{HostmaskEntry, PluginMap, PluginRecord};

    fn command(hostmask: &str, command: &str, args: &[&str]) -> CommandEvent {
        CommandEvent {
            channel: "#x".into(),
            nick: hostmask.split('!').next().unwrap_or_default().into(),
            hostmask: Some(hostmask.into()),
            command: command.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    fn setup(store: FakeStore) -> (BotContext, tokio::sync::mpsc::Receiver<String>) {
        let ctx = create_test_context(store);
        let mut plugins = PluginMap::new();
        plugins.insert(PLUGIN_ID.into(), PluginRecord::new(1, PLUGIN_ID));
        ctx.config.replace_plugins(plugins);
        let outbound = ctx.client.detach().unwrap();
        ctx.tracker.apply(&ClientEvent::Join {
            channel: "#x".into(),
            nick: "guacbot".into(),
            hostmask: None,
        });
        ctx.tracker.apply(&ClientEvent::Names {
            channel: "#x".into(),
            entries: vec!["@guacbot".into()],
        });
        ctx.tracker.apply(&ClientEvent::Join {
            channel: "#x".into(),
            nick: "bob".into(),
            hostmask: Some("bob!b@friend.net".into()),
        });
        (ctx, outbound)
    }

    #[tokio::test]
    async fn test_add_friend_grants_and_persists() {
        let store = FakeStore::default();
        let (ctx, mut outbound) = setup(store.clone());
        let squire = Squire::new();

        handle(&squire, &ctx, &command(ADMIN_HOSTMASK, "af", &["bob", "o"]))
            .await
            .unwrap();

        // Granted once; the rescan does not repeat it.
        assert_eq!(drain(&mut outbound), vec!["MODE #x +o bob"]);
        assert_eq!(
            store.hostmasks(),
            vec![HostmaskEntry {
                pattern: "bob!b@friend.net".into(),
                mode: 'o',
                is_friend: true,
            }]
        );
        assert_eq!(squire.rules().friends().len(), 1);
    }

    #[tokio::test]
    async fn test_add_friend_uses_default_mode() {
        let store = FakeStore::default();
        let (ctx, mut outbound) = setup(store.clone());

        handle(&Squire::new(), &ctx, &command(ADMIN_HOSTMASK, "af", &["bob"]))
            .await
            .unwrap();
        assert_eq!(drain(&mut outbound), vec!["MODE #x +v bob"]);
    }

    #[tokio::test]
    async fn test_add_friend_rescan_covers_other_members() {
        let store = FakeStore::default().with_hostmasks(vec![HostmaskEntry {
            pattern: "*!*@voice.net".into(),
            mode: 'v',
            is_friend: true,
        }]);
        let (ctx, mut outbound) = setup(store);
        ctx.tracker.apply(&ClientEvent::Join {
            channel: "#x".into(),
            nick: "carol".into(),
            hostmask: Some("carol!c@voice.net".into()),
        });

        handle(&Squire::new(), &ctx, &command(ADMIN_HOSTMASK, "af", &["bob", "o"]))
            .await
            .unwrap();
        let mut lines = drain(&mut outbound);
        assert_eq!(lines.remove(0), "MODE #x +o bob");
        assert_eq!(lines, vec!["MODE #x +v carol"]);
    }

    #[tokio::test]
    async fn test_remove_friend_soft_disables_without_revoking() {
        let store = FakeStore::default().with_hostmasks(vec![HostmaskEntry {
            pattern: "bob!b@friend.net".into(),
            mode: 'o',
            is_friend: true,
        }]);
        let (ctx, mut outbound) = setup(store.clone());

        handle(&Squire::new(), &ctx, &command(ADMIN_HOSTMASK, "rf", &["bob"]))
            .await
            .unwrap();

        assert_eq!(store.disabled(), vec!["bob!b@friend.net".to_string()]);
        assert!(store.hostmasks().is_empty());
        assert!(drain(&mut outbound).is_empty());
    }

    #[tokio::test]
    async fn test_non_admin_is_ignored() {
        let store = FakeStore::default().with_hostmasks(vec![HostmaskEntry {
            pattern: "bob!b@friend.net".into(),
            mode: 'o',
            is_friend: true,
        }]);
        let (ctx, mut outbound) = setup(store.clone());
        let squire = Squire::new();

        let err = handle(&squire, &ctx, &command("mallory!m@evil.net", "rf", &["bob"]))
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::AuthorizationDenied));

        let event = crate::events::BotEvent::AddressedCommand(command("mallory!m@evil.net", "af", &["bob"]));
        assert!(squire.handle(&ctx, &event).await.is_err());

        assert!(store.disabled().is_empty());
        assert_eq!(store.hostmasks().len(), 1);
        assert!(drain(&mut outbound).is_empty());
    }

    #[tokio::test]
    async fn test_unresolved_nick_replies_error() {
        let (ctx, mut outbound) = setup(FakeStore::default());

        handle(&Squire::new(), &ctx, &command(ADMIN_HOSTMASK, "if", &["nobody"]))
            .await
            .unwrap();
        assert_eq!(drain(&mut outbound), vec!["PRIVMSG #x :error lol"]);
    }

    #[tokio::test]
    async fn test_store_failure_replies_with_error() {
        let store = FakeStore::default();
        store.fail_writes(true);
        let (ctx, mut outbound) = setup(store);

        handle(&Squire::new(), &ctx, &command(ADMIN_HOSTMASK, "rf", &["bob"]))
            .await
            .unwrap();
        let lines = drain(&mut outbound);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("PRIVMSG #x :error lol: "));
    }

    #[tokio::test]
    async fn test_is_friend_and_scan_replies() {
        let store = FakeStore::default().with_hostmasks(vec![HostmaskEntry {
            pattern: "*!*@friend.net".into(),
            mode: 'v',
            is_friend: true,
        }]);
        let (ctx, mut outbound) = setup(store);
        let squire = Squire::new();
        squire.refresh(&ctx).await.unwrap();

        handle(&squire, &ctx, &command(ADMIN_HOSTMASK, "if", &["bob"]))
            .await
            .unwrap();
        assert_eq!(drain(&mut outbound), vec!["PRIVMSG #x yes"]);

        handle(&squire, &ctx, &command(ADMIN_HOSTMASK, "scan", &[]))
            .await
            .unwrap();
        assert_eq!(
            drain(&mut outbound),
            vec!["MODE #x +v bob", "PRIVMSG #x scanning!"]
        );
    }

    #[tokio::test]
    async fn test_unrelated_commands_pass_through() {
        let (ctx, mut outbound) = setup(FakeStore::default());
        handle(&Squire::new(), &ctx, &command("mallory!m@evil.net", "reload", &[]))
            .await
            .unwrap();
        assert!(drain(&mut outbound).is_empty());
    }
}

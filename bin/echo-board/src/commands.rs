use anyhow::{anyhow, bail, Context};
use eb_core::{decode_route_token, encode_route_token, Collection, StrongRef};
use eb_configs::Settings;
use eb_services::boards::{create_board, list_boards, NewBoard};
use eb_services::posts::{create_post, list_posts, NewPost};
use eb_services::reactions::{count_reactions, list_reactions_for_subject, toggle_reaction, ReactionQuery};
use eb_services::threads::{create_thread, list_threads, NewThread};
use eb_services::{AggregationScope, ClientContext};

use crate::cli::{Command, ScopeArgs};

pub async fn run(ctx: &ClientContext, settings: &Settings, command: Command) -> anyhow::Result<()> {
    let scope = |args: ScopeArgs| AggregationScope::from_flag(args.include_follows(settings.include_follows));

    match command {
        Command::Login { identifier, service } => {
            let identifier = identifier
                .or_else(|| settings.identifier.clone())
                .context("no identifier given; pass --identifier or set ECHOBOARD_IDENTIFIER")?;
            let password = settings
                .app_password
                .as_ref()
                .context("no app password configured; set ECHOBOARD_APP_PASSWORD")?;
            let service = service.unwrap_or_else(|| settings.service_url.clone());
            let state = ctx.login(&service, &identifier, password).await?;
            println!(
                "logged in as {} ({})",
                state.handle.unwrap_or_default(),
                state.actor_id.unwrap_or_default()
            );
        }

        Command::Logout => {
            ctx.logout().await?;
            println!("logged out");
        }

        Command::Whoami => {
            let state = ctx.session().snapshot();
            match (ctx.session().is_logged_in(), state.actor_id) {
                (true, Some(actor)) => println!(
                    "{} ({}) on {}",
                    state.handle.unwrap_or_default(),
                    actor,
                    ctx.service_url()
                ),
                _ => println!("not logged in"),
            }
        }

        Command::Boards { scope: args } => {
            for board in list_boards(ctx, scope(args)).await? {
                println!("{board}");
            }
        }

        Command::Threads { board, scope: args } => {
            for thread in list_threads(ctx, board.as_deref(), scope(args)).await? {
                println!(
                    "{}  {}  [{}]  {}",
                    encode_route_token(&thread.uri),
                    thread.value.created_at.format("%Y-%m-%d %H:%M"),
                    thread.value.board.as_deref().unwrap_or("-"),
                    thread.value.title
                );
            }
        }

        Command::NewBoard { name, description } => {
            let board = create_board(ctx, NewBoard { name, description }).await?;
            println!("{}", board.value.board_id);
        }

        Command::NewThread { title, board } => {
            let created = create_thread(ctx, NewThread { title, board }).await?;
            println!("{}", encode_route_token(&created.uri));
        }

        Command::Posts { thread, scope: args } => {
            let thread_uri = decode_route_token(&thread)?;
            for post in list_posts(ctx, Some(thread_uri.as_str()), scope(args)).await? {
                println!(
                    "{}  {}  {}",
                    encode_route_token(&post.uri),
                    post.value.created_at.format("%Y-%m-%d %H:%M"),
                    post.value.text
                );
            }
        }

        Command::Reply { thread, text, reply_to } => {
            let thread_uri = decode_route_token(&thread)?;
            let reply_to = match reply_to {
                Some(token) => Some(resolve_subject(ctx, &decode_route_token(&token)?).await?),
                None => None,
            };
            let created = create_post(
                ctx,
                NewPost {
                    thread_uri,
                    text,
                    reply_to,
                },
            )
            .await?;
            println!("{}", encode_route_token(&created.uri));
        }

        Command::React { subject, kind } => {
            let subject = resolve_subject(ctx, &decode_route_token(&subject)?).await?;
            toggle_reaction(ctx, subject, kind).await?;
            println!("{kind}");
        }

        Command::Reactions {
            subject,
            repo,
            cursor,
            limit,
        } => {
            let page = list_reactions_for_subject(
                ctx,
                ReactionQuery {
                    subject_uri: decode_route_token(&subject)?,
                    repo,
                    cursor,
                    limit,
                },
            )
            .await?;
            for (kind, count) in count_reactions(&page.records).iter() {
                println!("{:<6} {count}", kind.as_str());
            }
            if let Some(cursor) = page.cursor {
                println!("next: {cursor}");
            }
        }
    }
    Ok(())
}

/// Collection named by a resource URI of the form `at://{repo}/{collection}/{rkey}`.
pub fn uri_collection(uri: &str) -> Option<Collection> {
    let path = uri.strip_prefix("at://")?;
    let mut segments = path.split('/');
    let (_repo, collection, rkey) = (segments.next()?, segments.next()?, segments.next()?);
    if rkey.is_empty() || segments.next().is_some() {
        return None;
    }
    collection.parse().ok()
}

/// Strong reference of a thread or post visible to the caller.
async fn resolve_subject(ctx: &ClientContext, uri: &str) -> anyhow::Result<StrongRef> {
    let scope = AggregationScope::IncludeFollows;
    let found = match uri_collection(uri) {
        Some(Collection::Thread) => list_threads(ctx, None, scope)
            .await?
            .into_iter()
            .find(|t| t.uri == uri)
            .map(|t| t.strong_ref()),
        Some(Collection::Post) => list_posts(ctx, None, scope)
            .await?
            .into_iter()
            .find(|p| p.uri == uri)
            .map(|p| p.strong_ref()),
        _ => bail!("{uri} is not a thread or post"),
    };
    found.ok_or_else(|| anyhow!("{uri} not found in your repository or the accounts you follow"))
}

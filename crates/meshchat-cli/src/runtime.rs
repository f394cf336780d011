//! Interactive event loop.
//!
//! Hosts several tabs on one in-process rendezvous. Console lines and clock
//! ticks are multiplexed with `tokio::select!`; after each, every tab's
//! presentation updates are written out, prefixed with the tab number.

use std::io;

use meshchat_core::{Environment, SessionConfig, SessionError, SessionEvent};
use meshchat_harness::{SimNetwork, TICK_INTERVAL, TabId};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::{
    SystemEnv,
    console::{CONSOLE_HELP, ConsoleCommand, mime_for, parse_console},
    names,
    render::render,
};

/// Runtime errors. Session and console failures are shown to the user and
/// never end the loop; only broken I/O does.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Console I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Multi-tab console runtime.
pub struct Runtime<W> {
    network: SimNetwork<SystemEnv>,
    config: SessionConfig,
    active: TabId,
    out: W,
}

impl Runtime<tokio::io::Stdout> {
    /// Runtime writing to stdout with `tabs` tabs open.
    pub fn new(config: SessionConfig, tabs: usize) -> Self {
        Self::with_output(config, tabs, tokio::io::stdout())
    }
}

impl<W: AsyncWrite + Unpin> Runtime<W> {
    /// Runtime writing to `out` with `tabs` tabs open (at least one).
    pub fn with_output(config: SessionConfig, tabs: usize, out: W) -> Self {
        let mut network = SimNetwork::with_env(SystemEnv::new());
        for _ in 0..tabs.max(1) {
            network.open_tab_with(config.clone());
        }
        Self { network, config, active: 0, out }
    }

    /// Underlying network.
    pub fn network(&self) -> &SimNetwork<SystemEnv> {
        &self.network
    }

    /// Tab that receives typed lines.
    pub fn active(&self) -> TabId {
        self.active
    }

    /// Output sink.
    pub fn output(&self) -> &W {
        &self.out
    }

    /// Run until `:quit` or end of input, then leave every channel.
    pub async fn run<R: AsyncBufRead + Unpin>(&mut self, input: R) -> Result<(), RuntimeError> {
        let count = self.network.tab_count();
        self.write_line(&format!("{count} tab(s) open, typing into tab 0. :help for commands"))
            .await?;

        let env = *self.network.env();
        let mut lines = input.lines();

        loop {
            let quit = tokio::select! {
                line = lines.next_line() => match line? {
                    Some(line) => self.handle_line(&line).await?,
                    None => true,
                },
                () = env.sleep(TICK_INTERVAL) => {
                    self.network.tick();
                    false
                },
            };
            self.flush_updates().await?;
            if quit {
                break;
            }
        }

        self.shutdown().await
    }

    /// Apply one console line. Returns whether the user asked to quit.
    pub async fn handle_line(&mut self, line: &str) -> Result<bool, RuntimeError> {
        if line.trim().is_empty() {
            return Ok(false);
        }

        let command = match parse_console(line) {
            Ok(command) => command,
            Err(err) => {
                self.write_line(&format!("! {err}")).await?;
                return Ok(false);
            },
        };
        tracing::debug!(tab = self.active, ?command, "console command");

        let tab = self.active;
        let result = match command {
            ConsoleCommand::Open => {
                self.active = self.network.open_tab_with(self.config.clone());
                self.write_line(&format!("opened tab {}", self.active)).await?;
                Ok(())
            },
            ConsoleCommand::Switch(target) if target < self.network.tab_count() => {
                self.active = target;
                self.write_line(&format!("typing into tab {target}")).await?;
                Ok(())
            },
            ConsoleCommand::Switch(target) => {
                self.write_line(&format!("! no tab {target}")).await?;
                Ok(())
            },
            ConsoleCommand::Tabs => {
                let listing = self.tab_listing();
                self.write_line(&listing).await?;
                Ok(())
            },
            ConsoleCommand::Create { channel_id, codename } => {
                let env = *self.network.env();
                match channel_id.map_or_else(|| names::channel_id(&env), Ok) {
                    Ok(channel_id) => {
                        let codename = codename.unwrap_or_else(|| names::codename(&env));
                        self.network.create(tab, &codename, &channel_id)
                    },
                    Err(err) => Err(SessionError::from(err)),
                }
            },
            ConsoleCommand::Join { channel_id, codename } => {
                let codename = codename.unwrap_or_else(|| names::codename(self.network.env()));
                self.network.join(tab, &codename, &channel_id)
            },
            ConsoleCommand::File(path) => match tokio::fs::read(&path).await {
                Ok(data) => {
                    let file_name = path
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    self.network.send_file(tab, &file_name, mime_for(&path), data)
                },
                Err(err) => {
                    self.write_line(&format!("! cannot read {}: {err}", path.display())).await?;
                    Ok(())
                },
            },
            ConsoleCommand::Leave => self.network.intent(tab, SessionEvent::Leave),
            ConsoleCommand::Back => self.network.intent(tab, SessionEvent::ReturnToLanding),
            ConsoleCommand::Help => {
                self.write_line(CONSOLE_HELP).await?;
                Ok(())
            },
            ConsoleCommand::Quit => return Ok(true),
            ConsoleCommand::Input(line) => self.network.input(tab, &line),
        };

        if let Err(err) = result {
            self.write_line(&format!("[{tab}] ! {err}")).await?;
        }
        Ok(false)
    }

    /// Write every tab's pending presentation updates.
    pub async fn flush_updates(&mut self) -> Result<(), RuntimeError> {
        for tab in 0..self.network.tab_count() {
            for update in self.network.take_ui(tab) {
                let Some(text) = render(&update) else { continue };
                for line in text.lines() {
                    self.write_line(&format!("[{tab}] {line}")).await?;
                }
            }
        }
        self.out.flush().await?;
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), RuntimeError> {
        for tab in 0..self.network.tab_count() {
            self.network.leave(tab);
        }
        self.flush_updates().await
    }

    fn tab_listing(&self) -> String {
        (0..self.network.tab_count())
            .map(|tab| {
                let session = self.network.session(tab);
                let marker = if tab == self.active { '*' } else { ' ' };
                let channel = session.channel_id().map(|id| id.to_fragment()).unwrap_or_default();
                let peers = session.connected_peer_count();
                format!(
                    "{marker} tab {tab}: {} {} {channel} ({peers} connected)",
                    session.state(),
                    session.codename()
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    async fn write_line(&mut self, line: &str) -> Result<(), RuntimeError> {
        self.out.write_all(line.as_bytes()).await?;
        self.out.write_all(b"\n").await?;
        Ok(())
    }
}

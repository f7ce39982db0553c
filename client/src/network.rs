use crate::game::ClientGameState;
use crate::input::InputManager;
use log::{debug, error, info};
use shared::commands::client::{ClientCommand, LoginExistingChar};
use shared::commands::server::ServerCommand;
use shared::{BufferError, FrameBuffer};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{interval, sleep, MissedTickBehavior};

const CLIENT_VERSION: (u8, u8, u8) = (0, 13, 0);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("network error: {0}")]
    Io(#[from] std::io::Error),
    #[error("undecodable server data: {0}")]
    Protocol(BufferError),
    #[error("server closed the connection")]
    Closed,
}

/// Decodes every complete server command in `buf`, leaving a trailing
/// partial command for the next read.
pub fn decode_available(buf: &mut FrameBuffer) -> Result<Vec<ServerCommand>, ClientError> {
    let mut commands = Vec::new();
    while !buf.is_empty() {
        buf.mark();
        match ServerCommand::read(buf) {
            Ok(command) => {
                buf.commit();
                commands.push(command);
            }
            Err(e) if e.is_insufficient() => {
                buf.rollback();
                break;
            }
            Err(e) => return Err(ClientError::Protocol(e)),
        }
    }
    Ok(commands)
}

pub struct Client {
    stream: TcpStream,
    inbound: FrameBuffer,
    pub game_state: ClientGameState,
    input_manager: InputManager,
    step: Duration,
}

impl Client {
    pub async fn connect(
        server_addr: &str,
        input_manager: InputManager,
        step: Duration,
    ) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(server_addr).await?;
        stream.set_nodelay(true)?;
        info!("Connected to {}", server_addr);

        Ok(Client {
            stream,
            inbound: FrameBuffer::new(),
            game_state: ClientGameState::new(),
            input_manager,
            step,
        })
    }

    pub async fn send(&mut self, command: &ClientCommand) -> Result<(), ClientError> {
        debug!("-> {}", command.opcode());
        self.stream.write_all(&command.to_bytes()).await?;
        Ok(())
    }

    pub async fn login(&mut self, name: &str, password: &str) -> Result<(), ClientError> {
        let (version_major, version_minor, version_patch) = CLIENT_VERSION;
        let login = ClientCommand::from(LoginExistingChar {
            name: name.to_string(),
            password: password.to_string(),
            version_major,
            version_minor,
            version_patch,
        });
        self.send(&login).await
    }

    fn handle_bytes(&mut self, bytes: &[u8]) -> Result<(), ClientError> {
        self.inbound.append(bytes);
        for command in decode_available(&mut self.inbound)? {
            debug!("<- {}", command.opcode());
            self.game_state.apply_server_command(&command);
        }
        Ok(())
    }

    async fn send_next_input(&mut self) -> Result<(), ClientError> {
        if !self.game_state.logged_in {
            return Ok(());
        }
        let Some(command) = self.input_manager.next_command() else {
            return Ok(());
        };
        if let ClientCommand::Walk(walk) = &command {
            self.game_state.apply_prediction(walk.heading);
        }
        self.send(&command).await
    }

    /// Runs the script, one command per step, then keeps reading for
    /// `linger` before returning.
    pub async fn run(&mut self, linger: Duration) -> Result<(), ClientError> {
        let mut step_interval = interval(self.step);
        step_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut buffer = [0u8; 4096];

        loop {
            tokio::select! {
                read = self.stream.read(&mut buffer) => match read {
                    Ok(0) => {
                        info!("Server closed the connection");
                        return Ok(());
                    }
                    Ok(len) => self.handle_bytes(&buffer[..len])?,
                    Err(e) => {
                        error!("Error reading from server: {}", e);
                        return Err(e.into());
                    }
                },
                _ = step_interval.tick() => {
                    self.send_next_input().await?;
                    if self.game_state.logged_in && self.input_manager.is_done() {
                        break;
                    }
                }
            }
        }

        let deadline = sleep(linger);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                read = self.stream.read(&mut buffer) => match read {
                    Ok(0) => return Ok(()),
                    Ok(len) => self.handle_bytes(&buffer[..len])?,
                    Err(e) => return Err(e.into()),
                },
                _ = &mut deadline => return Ok(()),
            }
        }
    }
}

use std::sync::Arc;

use tokio::{
    sync::{broadcast, mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{error, info};

use crate::{
    channel_manager::{ChannelConnectionState, Participant},
    error::VoiceError,
    events::VoiceEvent,
    orchestrator::{TransmissionRoute, VoiceLoginState, VoiceOrchestrator},
    token_exchange::TokenExchange,
};

type Reply<T> = oneshot::Sender<T>;

pub(crate) enum VoiceCommand {
    Initialize {
        reply: Reply<Result<(), VoiceError>>,
    },
    Login {
        credentials: Arc<dyn TokenExchange>,
        username: String,
        reply: Reply<Result<(), VoiceError>>,
    },
    Logout {
        reply: Reply<Result<(), VoiceError>>,
    },
    Join {
        channel: String,
        reply: Reply<Result<(), VoiceError>>,
    },
    Leave {
        channel: String,
        reply: Reply<Result<(), VoiceError>>,
    },
    LeaveAll {
        reply: Reply<()>,
    },
    SetTransmissionChannel {
        channel: String,
        reply: Reply<Result<(), VoiceError>>,
    },
    SetTransmissionAll {
        reply: Reply<Result<(), VoiceError>>,
    },
    SetTransmissionNone {
        reply: Reply<Result<(), VoiceError>>,
    },
    SetLocalMute {
        muted: bool,
        reply: Reply<Result<(), VoiceError>>,
    },
    SetPlayerMute {
        channel: String,
        participant_id: String,
        muted: bool,
        reply: Reply<Result<(), VoiceError>>,
    },
    IsPlayerMuted {
        channel: String,
        participant_id: String,
        reply: Reply<bool>,
    },
    Snapshot {
        reply: Reply<VoiceSnapshot>,
    },
    Shutdown {
        reply: Reply<()>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSnapshot {
    pub name: String,
    pub state: ChannelConnectionState,
    pub participants: Vec<Participant>,
}

/// Point-in-time copy of the orchestrator state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceSnapshot {
    pub login_state: VoiceLoginState,
    pub username: Option<String>,
    pub channels: Vec<ChannelSnapshot>,
    pub transmission: TransmissionRoute,
    pub local_muted: bool,
}

impl VoiceSnapshot {
    fn capture(orchestrator: &VoiceOrchestrator) -> Self {
        Self {
            login_state: orchestrator.login_state(),
            username: orchestrator.username().map(str::to_string),
            channels: orchestrator
                .channel_names()
                .into_iter()
                .map(|name| ChannelSnapshot {
                    state: orchestrator.channel_state(&name),
                    participants: orchestrator.participants(&name),
                    name,
                })
                .collect(),
            transmission: orchestrator.transmission_route(),
            local_muted: orchestrator.is_local_muted(),
        }
    }

    pub fn channel(&self, name: &str) -> Option<&ChannelSnapshot> {
        self.channels.iter().find(|channel| channel.name == name)
    }
}

/// Cloneable front end for a [`VoiceOrchestrator`] running on its own task.
#[derive(Clone)]
pub struct VoiceChatHandle {
    commands: mpsc::Sender<VoiceCommand>,
    events: broadcast::Sender<VoiceEvent>,
}

impl VoiceChatHandle {
    pub fn subscribe_events(&self) -> broadcast::Receiver<VoiceEvent> {
        self.events.subscribe()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(Reply<T>) -> VoiceCommand,
    ) -> Result<T, VoiceError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| VoiceError::ServiceStopped)?;
        rx.await.map_err(|_| VoiceError::ServiceStopped)
    }

    pub async fn initialize(&self) -> Result<(), VoiceError> {
        self.request(|reply| VoiceCommand::Initialize { reply })
            .await?
    }

    /// The service keeps only a weak reference to `credentials`; the caller
    /// has to hold on to its `Arc` for later joins to get tokens.
    pub async fn login(
        &self,
        credentials: &Arc<dyn TokenExchange>,
        username: impl Into<String>,
    ) -> Result<(), VoiceError> {
        let credentials = Arc::clone(credentials);
        let username = username.into();
        self.request(|reply| VoiceCommand::Login {
            credentials,
            username,
            reply,
        })
        .await?
    }

    pub async fn logout(&self) -> Result<(), VoiceError> {
        self.request(|reply| VoiceCommand::Logout { reply }).await?
    }

    pub async fn join_channel(&self, channel: impl Into<String>) -> Result<(), VoiceError> {
        let channel = channel.into();
        self.request(|reply| VoiceCommand::Join { channel, reply })
            .await?
    }

    pub async fn leave_channel(&self, channel: impl Into<String>) -> Result<(), VoiceError> {
        let channel = channel.into();
        self.request(|reply| VoiceCommand::Leave { channel, reply })
            .await?
    }

    pub async fn leave_all_channels(&self) -> Result<(), VoiceError> {
        self.request(|reply| VoiceCommand::LeaveAll { reply }).await
    }

    pub async fn set_transmission_channel(
        &self,
        channel: impl Into<String>,
    ) -> Result<(), VoiceError> {
        let channel = channel.into();
        self.request(|reply| VoiceCommand::SetTransmissionChannel { channel, reply })
            .await?
    }

    pub async fn set_transmission_to_all(&self) -> Result<(), VoiceError> {
        self.request(|reply| VoiceCommand::SetTransmissionAll { reply })
            .await?
    }

    pub async fn set_transmission_to_none(&self) -> Result<(), VoiceError> {
        self.request(|reply| VoiceCommand::SetTransmissionNone { reply })
            .await?
    }

    pub async fn set_local_mute(&self, muted: bool) -> Result<(), VoiceError> {
        self.request(|reply| VoiceCommand::SetLocalMute { muted, reply })
            .await?
    }

    pub async fn set_player_mute(
        &self,
        channel: impl Into<String>,
        participant_id: impl Into<String>,
        muted: bool,
    ) -> Result<(), VoiceError> {
        let channel = channel.into();
        let participant_id = participant_id.into();
        self.request(|reply| VoiceCommand::SetPlayerMute {
            channel,
            participant_id,
            muted,
            reply,
        })
        .await?
    }

    pub async fn is_player_muted(
        &self,
        channel: impl Into<String>,
        participant_id: impl Into<String>,
    ) -> Result<bool, VoiceError> {
        let channel = channel.into();
        let participant_id = participant_id.into();
        self.request(|reply| VoiceCommand::IsPlayerMuted {
            channel,
            participant_id,
            reply,
        })
        .await
    }

    pub async fn snapshot(&self) -> Result<VoiceSnapshot, VoiceError> {
        self.request(|reply| VoiceCommand::Snapshot { reply }).await
    }

    /// Leaves all channels, logs out and stops the service task.
    pub async fn shutdown(&self) -> Result<(), VoiceError> {
        self.request(|reply| VoiceCommand::Shutdown { reply }).await
    }
}

/// Moves `orchestrator` onto a dedicated task. Commands and backend results
/// are applied one at a time on that task.
pub fn spawn_service(
    orchestrator: VoiceOrchestrator,
    capacity: usize,
) -> (VoiceChatHandle, JoinHandle<()>) {
    let (commands_tx, commands_rx) = mpsc::channel(capacity.max(1));
    let handle = VoiceChatHandle {
        commands: commands_tx,
        events: orchestrator.event_sender(),
    };
    let task = tokio::spawn(run_service(orchestrator, commands_rx));
    (handle, task)
}

async fn run_service(
    mut orchestrator: VoiceOrchestrator,
    mut commands: mpsc::Receiver<VoiceCommand>,
) {
    let Some(mut mailbox) = orchestrator.take_mailbox() else {
        error!("voice: service started without a completion mailbox");
        return;
    };
    info!("voice: service started");

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(VoiceCommand::Shutdown { reply }) => {
                    orchestrator.uninitialize();
                    let _ = reply.send(());
                    break;
                }
                Some(command) => apply_command(&mut orchestrator, command),
                None => {
                    orchestrator.uninitialize();
                    break;
                }
            },
            Some(completion) = mailbox.recv() => orchestrator.handle_completion(completion),
        }
    }

    info!("voice: service stopped");
}

fn apply_command(orchestrator: &mut VoiceOrchestrator, command: VoiceCommand) {
    match command {
        VoiceCommand::Initialize { reply } => {
            let _ = reply.send(orchestrator.initialize());
        }
        VoiceCommand::Login {
            credentials,
            username,
            reply,
        } => {
            let _ = reply.send(orchestrator.login(&credentials, &username));
        }
        VoiceCommand::Logout { reply } => {
            let _ = reply.send(orchestrator.logout());
        }
        VoiceCommand::Join { channel, reply } => {
            let _ = reply.send(orchestrator.join_channel(&channel));
        }
        VoiceCommand::Leave { channel, reply } => {
            let _ = reply.send(orchestrator.leave_channel(&channel));
        }
        VoiceCommand::LeaveAll { reply } => {
            orchestrator.leave_all_channels();
            let _ = reply.send(());
        }
        VoiceCommand::SetTransmissionChannel { channel, reply } => {
            let _ = reply.send(orchestrator.set_transmission_channel(&channel));
        }
        VoiceCommand::SetTransmissionAll { reply } => {
            let _ = reply.send(orchestrator.set_transmission_to_all());
        }
        VoiceCommand::SetTransmissionNone { reply } => {
            let _ = reply.send(orchestrator.set_transmission_to_none());
        }
        VoiceCommand::SetLocalMute { muted, reply } => {
            let _ = reply.send(orchestrator.set_local_mute(muted));
        }
        VoiceCommand::SetPlayerMute {
            channel,
            participant_id,
            muted,
            reply,
        } => {
            let _ = reply.send(orchestrator.set_player_mute(&channel, &participant_id, muted));
        }
        VoiceCommand::IsPlayerMuted {
            channel,
            participant_id,
            reply,
        } => {
            let _ = reply.send(orchestrator.is_player_muted(&channel, &participant_id));
        }
        VoiceCommand::Snapshot { reply } => {
            let _ = reply.send(VoiceSnapshot::capture(orchestrator));
        }
        // Handled by the service loop before dispatch.
        VoiceCommand::Shutdown { reply } => {
            let _ = reply.send(());
        }
    }
}

#[cfg(test)]
#[path = "tests/service_tests.rs"]
mod tests;

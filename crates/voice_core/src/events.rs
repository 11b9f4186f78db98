/// Notifications published by the orchestrator, in the order state changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceEvent {
    LoginCompleted {
        success: bool,
    },
    LogoutCompleted,
    ChannelJoined {
        channel: String,
        success: bool,
    },
    ChannelLeft {
        channel: String,
    },
    ParticipantAdded {
        channel: String,
        participant_id: String,
        display_name: String,
    },
    ParticipantRemoved {
        channel: String,
        participant_id: String,
    },
    ParticipantTalkingChanged {
        channel: String,
        participant_id: String,
        talking: bool,
    },
}

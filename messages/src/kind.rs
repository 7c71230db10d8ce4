use std::fmt;

/// Wire tag of a consensus message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    EndOfMinute = 0,
    Acknowledgement = 1,
    FaultReport = 2,
    HeartBeat = 10,
    RequestBlock = 17,
    DBState = 20,
}

impl MessageType {
    pub const ALL: [MessageType; 6] = [
        MessageType::EndOfMinute,
        MessageType::Acknowledgement,
        MessageType::FaultReport,
        MessageType::HeartBeat,
        MessageType::RequestBlock,
        MessageType::DBState,
    ];

    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.tag() == tag)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::EndOfMinute => "end_of_minute",
            Self::Acknowledgement => "ack",
            Self::FaultReport => "fault_report",
            Self::HeartBeat => "heartbeat",
            Self::RequestBlock => "request_block",
            Self::DBState => "dbstate",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

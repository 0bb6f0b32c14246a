//! Unified error handling for cinderd.
//!
//! Handler failures are recovered by the dispatcher and surfaced as IRC
//! numerics on the originating connection; variants that carry no numeric
//! (module vetoes, quits) are handled silently at the dispatch layer.

use cinder_proto::numeric;
use thiserror::Error;

/// Errors produced while mutating the user/channel graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("name already in use")]
    DuplicateName,

    #[error("membership limit reached")]
    TooManyChannels,

    #[error("already a member")]
    AlreadyJoined,

    #[error("not a member")]
    NotOnChannel,

    #[error("no such channel")]
    NoSuchChannel,

    #[error("no such nick")]
    NoSuchNick,

    #[error("output queue limit exceeded")]
    SendqExceeded,

    #[error("empty mode mask")]
    EmptyModeMask,
}

/// Errors that can occur during command handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    #[error("no such nick/channel: {0}")]
    NoSuchNick(String),

    #[error("no such channel: {0}")]
    NoSuchChannel(String),

    #[error("no such server: {0}")]
    NoSuchServer(String),

    #[error("not on channel: {0}")]
    NotOnChannel(String),

    #[error("channel operator privileges needed on {0}")]
    ChanOpPrivsNeeded(String),

    #[error("{0} is not on {1}")]
    UserNotInChannel(String, String),

    #[error("too many channels: {0}")]
    TooManyChannels(String),

    #[error("nickname in use: {0}")]
    NicknameInUse(String),

    #[error("erroneous nickname: {0}")]
    ErroneousNickname(String),

    #[error("no nickname given")]
    NoNicknameGiven,

    #[error("cannot send to channel {0}")]
    CannotSendToChan(String),

    #[error("already registered")]
    AlreadyRegistered,

    #[error("password mismatch")]
    PasswdMismatch,

    #[error("no matching oper block")]
    NoOperHost,

    #[error("permission denied")]
    PermissionDenied,

    #[error("channel is full: {0}")]
    ChannelIsFull(String),

    #[error("invite only: {0}")]
    InviteOnlyChan(String),

    #[error("banned from channel: {0}")]
    BannedFromChan(String),

    #[error("bad channel key: {0}")]
    BadChannelKey(String),

    #[error("ban list full: {0}")]
    BanListFull(String),

    #[error("users don't match")]
    UsersDontMatch,

    /// A module returned HALT; it is expected to have sent its own reply.
    #[error("vetoed by module")]
    Veto,

    /// The client asked to leave; torn down by the dispatcher.
    #[error("client quit: {0}")]
    Quit(String),
}

impl HandlerError {
    /// Map to the numeric reply and its text, where one exists.
    ///
    /// `Veto` and `Quit` produce no reply by design.
    pub fn to_numeric(&self) -> Option<(u16, String)> {
        match self {
            Self::NoSuchNick(n) => Some((
                numeric::ERR_NOSUCHNICK,
                format!("{n} :No such nick/channel"),
            )),
            Self::NoSuchChannel(c) => Some((
                numeric::ERR_NOSUCHCHANNEL,
                format!("{c} :No such channel"),
            )),
            Self::NoSuchServer(s) => Some((
                numeric::ERR_NOSUCHSERVER,
                format!("{s} :No such server"),
            )),
            Self::NotOnChannel(c) => Some((
                numeric::ERR_NOTONCHANNEL,
                format!("{c} :You're not on that channel"),
            )),
            Self::ChanOpPrivsNeeded(c) => Some((
                numeric::ERR_CHANOPRIVSNEEDED,
                format!("{c} :You're not channel operator"),
            )),
            Self::UserNotInChannel(n, c) => Some((
                numeric::ERR_USERNOTINCHANNEL,
                format!("{n} {c} :They aren't on that channel"),
            )),
            Self::TooManyChannels(c) => Some((
                numeric::ERR_TOOMANYCHANNELS,
                format!("{c} :You are on too many channels"),
            )),
            Self::NicknameInUse(n) => Some((
                numeric::ERR_NICKNAMEINUSE,
                format!("{n} :Nickname is already in use"),
            )),
            Self::ErroneousNickname(n) => Some((
                numeric::ERR_ERRONEUSNICKNAME,
                format!("{n} :Erroneous nickname"),
            )),
            Self::NoNicknameGiven => Some((
                numeric::ERR_NONICKNAMEGIVEN,
                ":No nickname given".to_string(),
            )),
            Self::CannotSendToChan(c) => Some((
                numeric::ERR_CANNOTSENDTOCHAN,
                format!("{c} :Cannot send to channel"),
            )),
            Self::AlreadyRegistered => Some((
                numeric::ERR_ALREADYREGISTERED,
                ":You may not reregister".to_string(),
            )),
            Self::PasswdMismatch => Some((
                numeric::ERR_PASSWDMISMATCH,
                ":Password incorrect".to_string(),
            )),
            Self::NoOperHost => Some((
                numeric::ERR_NOOPERHOST,
                ":Invalid oper credentials".to_string(),
            )),
            Self::PermissionDenied => Some((
                numeric::ERR_NOPRIVILEGES,
                ":Permission Denied - You do not have the required operator privileges".to_string(),
            )),
            Self::ChannelIsFull(c) => Some((
                numeric::ERR_CHANNELISFULL,
                format!("{c} :Cannot join channel (+l)"),
            )),
            Self::InviteOnlyChan(c) => Some((
                numeric::ERR_INVITEONLYCHAN,
                format!("{c} :Cannot join channel (+i)"),
            )),
            Self::BannedFromChan(c) => Some((
                numeric::ERR_BANNEDFROMCHAN,
                format!("{c} :Cannot join channel (+b)"),
            )),
            Self::BadChannelKey(c) => Some((
                numeric::ERR_BADCHANNELKEY,
                format!("{c} :Cannot join channel (+k)"),
            )),
            Self::BanListFull(c) => Some((
                numeric::ERR_BANLISTFULL,
                format!("{c} b :Channel ban list is full"),
            )),
            Self::UsersDontMatch => Some((
                numeric::ERR_USERSDONTMATCH,
                ":Cannot change mode for other users".to_string(),
            )),
            Self::Veto | Self::Quit(_) => None,
        }
    }
}

/// Result type for command handlers.
pub type HandlerResult = Result<(), HandlerError>;

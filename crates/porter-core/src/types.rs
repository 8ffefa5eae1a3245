use crate::{Result, error::Error};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical access point guarded by a terminal.
///
/// Terminals identify themselves with one of these names during the
/// connect handshake, and the same name selects the door strike to
/// actuate on a granted entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// Street-level gate (downstairs).
    Gate,
    /// Door at the top of the stairs.
    Upstairs,
    /// Elevator release.
    Elevator,
    /// Admin terminal used to enroll new users; opens nothing.
    Control,
}

impl Target {
    /// The name a terminal reports for this target.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Target::Gate => "gate",
            Target::Upstairs => "upstairs",
            Target::Elevator => "elevator",
            Target::Control => "control",
        }
    }

    /// Returns `true` for targets with a physical door strike.
    #[must_use]
    pub fn is_door(&self) -> bool {
        !matches!(self, Target::Control)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Target {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gate" => Ok(Target::Gate),
            "upstairs" => Ok(Target::Upstairs),
            "elevator" => Ok(Target::Elevator),
            "control" => Ok(Target::Control),
            other => Err(Error::UnknownTarget(other.to_string())),
        }
    }
}

/// Membership level driving which targets a user may open and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserLevel {
    /// Full members; may open every door at any hour and sponsor new users.
    Member,
    /// Trusted daily users; extended hours.
    Fulltimeuser,
    /// Regular users; daytime hours only.
    User,
    /// Temporarily suspended; never admitted.
    Hiatus,
    /// Holdover gate-only codes from the previous installation.
    Legacy,
}

impl UserLevel {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            UserLevel::Member => "member",
            UserLevel::Fulltimeuser => "fulltimeuser",
            UserLevel::User => "user",
            UserLevel::Hiatus => "hiatus",
            UserLevel::Legacy => "legacy",
        }
    }
}

impl fmt::Display for UserLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for UserLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "member" => Ok(UserLevel::Member),
            "fulltimeuser" => Ok(UserLevel::Fulltimeuser),
            "user" => Ok(UserLevel::User),
            "hiatus" => Ok(UserLevel::Hiatus),
            "legacy" => Ok(UserLevel::Legacy),
            other => Err(Error::UnknownUserLevel(other.to_string())),
        }
    }
}

/// LED state of a terminal, any combination of red, green and blue.
///
/// Encodes on the wire as the concatenation of the lit channels in
/// `R`, `G`, `B` order; all-off encodes as the empty string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Leds {
    pub red: bool,
    pub green: bool,
    pub blue: bool,
}

impl Leds {
    pub const OFF: Leds = Leds {
        red: false,
        green: false,
        blue: false,
    };
    pub const RED: Leds = Leds {
        red: true,
        green: false,
        blue: false,
    };
    pub const GREEN: Leds = Leds {
        red: false,
        green: true,
        blue: false,
    };
    pub const BLUE: Leds = Leds {
        red: false,
        green: false,
        blue: true,
    };

    /// Wire encoding: subset of `RGB`, empty when off.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut s = String::with_capacity(3);
        if self.red {
            s.push('R');
        }
        if self.green {
            s.push('G');
        }
        if self.blue {
            s.push('B');
        }
        s
    }
}

impl fmt::Display for Leds {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

/// Buzzer tone selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    High,
    Low,
}

impl Tone {
    /// Wire encoding of the tone.
    #[must_use]
    pub fn code(&self) -> char {
        match self {
            Tone::High => 'H',
            Tone::Low => 'L',
        }
    }
}

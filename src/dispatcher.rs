// Command parsing for the line protocol. Matching ignores case and surrounding whitespace.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Id,
    Status,
    Reset,
    Continuity,
    Resistance,
    Calibrate,
    Capacitance,
    CapacitanceCalibrate,
    ShellBond,
}
impl Command {
    const TABLE: [(&'static str, Command); 9] = [
        ("ID", Command::Id),
        ("STATUS", Command::Status),
        ("RESET", Command::Reset),
        ("CONT", Command::Continuity),
        ("RES", Command::Resistance),
        ("CAL", Command::Calibrate),
        ("CAP", Command::Capacitance),
        ("CAPCAL", Command::CapacitanceCalibrate),
        ("SHELL", Command::ShellBond),
    ];

    pub fn keyword(&self) -> &'static str {
        Command::TABLE.iter().find(|(_, c)| c == self).map(|(k, _)| *k).unwrap_or("")
    }

    /// Commands that touch the fixture. Refused unless the self-test passed.
    pub fn needs_ready(&self) -> bool {
        !matches!(self, Command::Id | Command::Status | Command::Reset)
    }

    pub fn needs_capacitance_network(&self) -> bool {
        matches!(self, Command::Capacitance | Command::CapacitanceCalibrate)
    }

    pub fn needs_shell_contacts(&self) -> bool {
        matches!(self, Command::ShellBond)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolError<'a> {
    UnknownCommand(&'a str),
    NotReady,
    Unsupported(&'static str),
    LineTooLong,
}

/// `Ok(None)` for a blank line, which gets no response at all.
pub fn parse(line: &str) -> Result<Option<Command>, ProtocolError<'_>> {
    let text = line.trim();
    if text.is_empty() {
        return Ok(None);
    }
    Command::TABLE
        .iter()
        .find(|(keyword, _)| keyword.eq_ignore_ascii_case(text))
        .map(|(_, command)| Some(*command))
        .ok_or(ProtocolError::UnknownCommand(text))
}

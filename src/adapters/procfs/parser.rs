use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Parse error: {0}")]
    Parse(String),
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Fields of /proc/{pid}/stat the supervisor cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcStat {
    pub pid: u32,
    pub comm: String,
    pub state: char,
    pub ppid: u32,
}

/// Parse /proc/{pid}/stat
pub fn parse_proc_stat(content: &str) -> ParseResult<ProcStat> {
    // Format: pid (comm) state ppid ...
    // comm may itself contain spaces and parentheses

    let start = content.find('(').ok_or_else(|| ParseError::Parse("No ( found".to_string()))?;
    let end = content.rfind(')').ok_or_else(|| ParseError::Parse("No ) found".to_string()))?;
    if end < start {
        return Err(ParseError::Parse("Unbalanced comm".to_string()));
    }

    let pid_str = content[..start].trim();
    let comm = content[start + 1..end].to_string();
    let after_comm = &content[end + 1..];

    let parts: Vec<&str> = after_comm.split_whitespace().collect();
    if parts.len() < 2 {
        return Err(ParseError::Parse("Incomplete proc stat".to_string()));
    }

    let pid: u32 = pid_str.parse().map_err(|e| ParseError::Parse(format!("pid: {}", e)))?;
    let state = parts[0].chars().next().unwrap_or('?');
    let ppid: u32 = parts[1].parse().map_err(|e| ParseError::Parse(format!("ppid: {}", e)))?;

    Ok(ProcStat { pid, comm, state, ppid })
}

/// Parse /proc/{pid}/cmdline (NUL separated argv) into a single line
pub fn parse_cmdline(content: &[u8]) -> String {
    content
        .split(|b| *b == 0)
        .filter(|arg| !arg.is_empty())
        .map(|arg| String::from_utf8_lossy(arg).into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

//! The server-side breakpoint table (`BREAKPOINT` command).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakpointTypeFlags {
    pub execute: bool,
    pub read: bool,
    pub write: bool,
}

impl BreakpointTypeFlags {
    #[must_use]
    pub fn from_str_flags(s: &str) -> Self {
        Self {
            execute: s.contains('x') || s.contains('X'),
            read: s.contains('r') || s.contains('R'),
            write: s.contains('w') || s.contains('W'),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Breakpoint {
    pub id: u32,
    pub cpu_type: String,
    pub memory_type: String,
    pub type_flags: BreakpointTypeFlags,
    pub start_addr: u32,
    pub end_addr: u32,
    pub enabled: bool,
    pub mark_event: bool,
    pub ignore_dummy: bool,
    pub condition: String,
}

pub const MAX_CONDITION_BYTES: usize = 1000;

#[derive(Default)]
pub struct BreakpointTable {
    next_id: u32,
    breakpoints: Vec<Breakpoint>,
}

impl BreakpointTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, mut bp: Breakpoint) -> u32 {
        self.next_id += 1;
        bp.id = self.next_id;
        if bp.condition.len() > MAX_CONDITION_BYTES {
            let mut boundary = MAX_CONDITION_BYTES;
            while !bp.condition.is_char_boundary(boundary) {
                boundary -= 1;
            }
            bp.condition.truncate(boundary);
        }
        let id = bp.id;
        self.breakpoints.push(bp);
        id
    }

    pub fn remove(&mut self, id: u32) -> bool {
        let before = self.breakpoints.len();
        self.breakpoints.retain(|bp| bp.id != id);
        self.breakpoints.len() != before
    }

    #[must_use]
    pub fn list(&self) -> &[Breakpoint] {
        &self.breakpoints
    }

    pub fn set_enabled(&mut self, id: u32, enabled: bool) -> bool {
        if let Some(bp) = self.breakpoints.iter_mut().find(|bp| bp.id == id) {
            bp.enabled = enabled;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(condition: &str) -> Breakpoint {
        Breakpoint {
            id: 0,
            cpu_type: "Main".to_string(),
            memory_type: "SnesMemory".to_string(),
            type_flags: BreakpointTypeFlags::from_str_flags("rw"),
            start_addr: 0,
            end_addr: 0,
            enabled: true,
            mark_event: false,
            ignore_dummy: false,
            condition: condition.to_string(),
        }
    }

    #[test]
    fn ids_increase_monotonically() {
        let mut table = BreakpointTable::new();
        let a = table.add(sample(""));
        let b = table.add(sample(""));
        assert!(b > a);
    }

    #[test]
    fn condition_is_bounded() {
        let mut table = BreakpointTable::new();
        let id = table.add(sample(&"x".repeat(2000)));
        let bp = table.list().iter().find(|bp| bp.id == id).unwrap();
        assert_eq!(bp.condition.len(), MAX_CONDITION_BYTES);
    }

    #[test]
    fn condition_truncation_does_not_split_multibyte_char() {
        let mut table = BreakpointTable::new();
        // every other char is 3 bytes wide, so a raw byte-length truncate at
        // MAX_CONDITION_BYTES (1000, even) lands mid-character here
        let condition: String = "a\u{20ac}".repeat(1000);
        let id = table.add(sample(&condition));
        let bp = table.list().iter().find(|bp| bp.id == id).unwrap();
        assert!(bp.condition.len() <= MAX_CONDITION_BYTES);
        assert!(bp.condition.is_char_boundary(bp.condition.len()));
    }

    #[test]
    fn remove_and_enable_disable_round_trip() {
        let mut table = BreakpointTable::new();
        let id = table.add(sample(""));
        assert!(table.set_enabled(id, false));
        assert!(!table.list()[0].enabled);
        assert!(table.remove(id));
        assert!(!table.remove(id));
    }
}

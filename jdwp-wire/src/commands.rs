// JDWP command set and command constants
//
// Only the sets this crate speaks or names in logs are listed:
// 1 = VirtualMachine
// 10 = StringReference
// 15 = EventRequest
// 64 = Event (sent by the VM)

// Command set IDs
pub mod command_sets {
    pub const VIRTUAL_MACHINE: u8 = 1;
    pub const STRING_REFERENCE: u8 = 10;
    pub const EVENT_REQUEST: u8 = 15;
    pub const EVENT: u8 = 64;
}

// VirtualMachine commands (set 1)
pub mod vm_commands {
    pub const VERSION: u8 = 1;
    pub const CLASSES_BY_SIGNATURE: u8 = 2;
    pub const ALL_CLASSES: u8 = 3;
    pub const ALL_THREADS: u8 = 4;
    pub const TOP_LEVEL_THREAD_GROUPS: u8 = 5;
    pub const DISPOSE: u8 = 6;
    pub const ID_SIZES: u8 = 7;
    pub const SUSPEND: u8 = 8;
    pub const RESUME: u8 = 9;
    pub const EXIT: u8 = 10;
    pub const CREATE_STRING: u8 = 11;
    pub const CAPABILITIES: u8 = 12;
    pub const CLASS_PATHS: u8 = 13;
    pub const DISPOSE_OBJECTS: u8 = 14;
    pub const HOLD_EVENTS: u8 = 15;
    pub const RELEASE_EVENTS: u8 = 16;
}

// StringReference commands (set 10)
pub mod string_reference_commands {
    pub const VALUE: u8 = 1;
}

// EventRequest commands (set 15)
pub mod event_commands {
    pub const SET: u8 = 1;
    pub const CLEAR: u8 = 2;
    pub const CLEAR_ALL_BREAKPOINTS: u8 = 3;
}

// Event commands (set 64)
pub mod event_set_commands {
    pub const COMPOSITE: u8 = 100;
}

// Event kinds, the single tag byte in front of every event record
pub mod event_kinds {
    pub const SINGLE_STEP: u8 = 1;
    pub const BREAKPOINT: u8 = 2;
    pub const FRAME_POP: u8 = 3;
    pub const EXCEPTION: u8 = 4;
    pub const USER_DEFINED: u8 = 5;
    pub const THREAD_START: u8 = 6;
    pub const THREAD_DEATH: u8 = 7;
    pub const CLASS_PREPARE: u8 = 8;
    pub const CLASS_UNLOAD: u8 = 9;
    pub const CLASS_LOAD: u8 = 10;
    pub const FIELD_ACCESS: u8 = 20;
    pub const FIELD_MODIFICATION: u8 = 21;
    pub const EXCEPTION_CATCH: u8 = 30;
    pub const METHOD_ENTRY: u8 = 40;
    pub const METHOD_EXIT: u8 = 41;
    pub const METHOD_EXIT_WITH_RETURN_VALUE: u8 = 42;
    pub const MONITOR_CONTENDED_ENTER: u8 = 43;
    pub const MONITOR_CONTENDED_ENTERED: u8 = 44;
    pub const MONITOR_WAIT: u8 = 45;
    pub const MONITOR_WAITED: u8 = 46;
    pub const VM_START: u8 = 90;
    pub const VM_DEATH: u8 = 99;
}

// EventRequest.Set modifier kinds
pub mod modifier_kinds {
    pub const COUNT: u8 = 1;
    pub const THREAD_ONLY: u8 = 3;
    pub const CLASS_ONLY: u8 = 4;
    pub const CLASS_MATCH: u8 = 5;
    pub const CLASS_EXCLUDE: u8 = 6;
    pub const LOCATION_ONLY: u8 = 7;
}

/// Human readable `Set.Command` name for logging, if the pair is known
pub fn command_name(command_set: u8, command: u8) -> Option<&'static str> {
    use command_sets::*;

    let name = match (command_set, command) {
        (VIRTUAL_MACHINE, vm_commands::VERSION) => "VirtualMachine.Version",
        (VIRTUAL_MACHINE, vm_commands::CLASSES_BY_SIGNATURE) => "VirtualMachine.ClassesBySignature",
        (VIRTUAL_MACHINE, vm_commands::ALL_CLASSES) => "VirtualMachine.AllClasses",
        (VIRTUAL_MACHINE, vm_commands::ALL_THREADS) => "VirtualMachine.AllThreads",
        (VIRTUAL_MACHINE, vm_commands::TOP_LEVEL_THREAD_GROUPS) => "VirtualMachine.TopLevelThreadGroups",
        (VIRTUAL_MACHINE, vm_commands::DISPOSE) => "VirtualMachine.Dispose",
        (VIRTUAL_MACHINE, vm_commands::ID_SIZES) => "VirtualMachine.IDSizes",
        (VIRTUAL_MACHINE, vm_commands::SUSPEND) => "VirtualMachine.Suspend",
        (VIRTUAL_MACHINE, vm_commands::RESUME) => "VirtualMachine.Resume",
        (VIRTUAL_MACHINE, vm_commands::EXIT) => "VirtualMachine.Exit",
        (VIRTUAL_MACHINE, vm_commands::CREATE_STRING) => "VirtualMachine.CreateString",
        (VIRTUAL_MACHINE, vm_commands::CAPABILITIES) => "VirtualMachine.Capabilities",
        (VIRTUAL_MACHINE, vm_commands::CLASS_PATHS) => "VirtualMachine.ClassPaths",
        (VIRTUAL_MACHINE, vm_commands::DISPOSE_OBJECTS) => "VirtualMachine.DisposeObjects",
        (VIRTUAL_MACHINE, vm_commands::HOLD_EVENTS) => "VirtualMachine.HoldEvents",
        (VIRTUAL_MACHINE, vm_commands::RELEASE_EVENTS) => "VirtualMachine.ReleaseEvents",
        (STRING_REFERENCE, string_reference_commands::VALUE) => "StringReference.Value",
        (EVENT_REQUEST, event_commands::SET) => "EventRequest.Set",
        (EVENT_REQUEST, event_commands::CLEAR) => "EventRequest.Clear",
        (EVENT_REQUEST, event_commands::CLEAR_ALL_BREAKPOINTS) => "EventRequest.ClearAllBreakpoints",
        (EVENT, event_set_commands::COMPOSITE) => "Event.Composite",
        _ => return None,
    };

    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_names() {
        assert_eq!(
            command_name(command_sets::EVENT, event_set_commands::COMPOSITE),
            Some("Event.Composite")
        );
        assert_eq!(
            command_name(command_sets::VIRTUAL_MACHINE, vm_commands::ID_SIZES),
            Some("VirtualMachine.IDSizes")
        );
        assert_eq!(command_name(16, 99), None);
    }
}

// src/errors/catalog.rs - Built-in error definitions
use super::{Category, ErrorDefinition, RecoveryAction, Severity};
use RecoveryAction::*;

pub static CATALOG: &[ErrorDefinition] = &[
    // Connection
    ErrorDefinition {
        code: "PLT-C001",
        name: "No Device Found",
        message: "No compatible plotter found",
        detail: "Could not find a compatible plotter on any USB port. The CH340 or EBB controller was not detected.",
        severity: Severity::Error,
        category: Category::Connection,
        remediation_steps: &[
            "Check that the USB cable is securely connected to both the plotter and computer",
            "Ensure the plotter is powered on (green power LED should be lit)",
            "Try a different USB port or USB cable",
            "Verify the device shows up in the operating system's USB device list",
            "Install the CH340 driver if it is not already installed",
        ],
        recovery_actions: &[Retry],
        auto_detected: true,
    },
    ErrorDefinition {
        code: "PLT-C002",
        name: "Port In Use",
        message: "Serial port is in use by another application",
        detail: "The serial port for the plotter is already open in another application.",
        severity: Severity::Error,
        category: Category::Connection,
        remediation_steps: &[
            "Close any other applications that might be using the plotter",
            "Check for terminal windows with open serial connections",
            "If the problem persists, unplug and reconnect the USB cable",
        ],
        recovery_actions: &[Retry],
        auto_detected: true,
    },
    ErrorDefinition {
        code: "PLT-C003",
        name: "Permission Denied",
        message: "Permission denied accessing serial port",
        detail: "The operating system denied access to the serial port.",
        severity: Severity::Error,
        category: Category::Connection,
        remediation_steps: &[
            "On Linux, add your user to the 'dialout' group and log in again",
            "Try running the application with administrator privileges",
            "Check that no other application has exclusive access to the port",
        ],
        recovery_actions: &[Retry],
        auto_detected: true,
    },
    ErrorDefinition {
        code: "PLT-C004",
        name: "Device Disconnected",
        message: "USB connection lost during operation",
        detail: "The plotter was unexpectedly disconnected while a command was in progress.",
        severity: Severity::Critical,
        category: Category::Connection,
        remediation_steps: &[
            "The USB connection was lost during plotting",
            "Check the USB cable immediately, it may have come loose",
            "Do NOT move the pen carriage by hand, the position will be lost",
            "Reconnect and home the plotter to reset the position",
            "You may need to restart the current plot from the beginning",
        ],
        recovery_actions: &[Reconnect, Home, Abort],
        auto_detected: true,
    },
    ErrorDefinition {
        code: "PLT-C005",
        name: "Device Not Responding",
        message: "Plotter connected but not responding",
        detail: "The USB device is detected but the firmware is not responding to commands. The plotter may be powered off.",
        severity: Severity::Error,
        category: Category::Connection,
        remediation_steps: &[
            "Check that the plotter's 12V power supply is connected",
            "The green power LED on the board should be lit",
            "Power cycle the plotter (unplug power, wait 5 seconds, reconnect)",
            "USB alone cannot power the plotter, external power is required",
        ],
        recovery_actions: &[Retry, Reconnect],
        auto_detected: true,
    },
    ErrorDefinition {
        code: "PLT-C006",
        name: "Not Connected",
        message: "No plotter connection is open",
        detail: "A command was issued while no serial connection to the plotter was open. A previous disconnection closes the connection.",
        severity: Severity::Error,
        category: Category::Connection,
        remediation_steps: &[
            "Connect to the plotter before sending commands",
            "If the plotter was disconnected, reconnect and home it",
        ],
        recovery_actions: &[Reconnect],
        auto_detected: true,
    },
    // Power
    ErrorDefinition {
        code: "PLT-W001",
        name: "Low Voltage",
        message: "Low voltage detected - power supply issue",
        detail: "The plotter detected insufficient motor voltage. The power supply may not be connected or is failing.",
        severity: Severity::Warning,
        category: Category::Power,
        remediation_steps: &[
            "Check that the 12V power adapter is plugged into both the wall and the plotter",
            "The green power LED on the board should be lit",
            "USB power alone is not sufficient to operate the motors",
            "If power is connected, try a different power adapter or outlet",
        ],
        recovery_actions: &[Retry, Abort],
        auto_detected: true,
    },
    // Communication
    ErrorDefinition {
        code: "PLT-X001",
        name: "Response Timeout",
        message: "Plotter did not respond in time",
        detail: "No complete response was received from the plotter within the timeout period.",
        severity: Severity::Error,
        category: Category::Communication,
        remediation_steps: &[
            "Check that the plotter is still powered on",
            "The plotter may be busy, wait a moment and try again",
            "If the problem persists, disconnect and reconnect",
        ],
        recovery_actions: &[Retry, Reconnect],
        auto_detected: true,
    },
    ErrorDefinition {
        code: "PLT-X002",
        name: "Invalid Response",
        message: "Unexpected response from plotter",
        detail: "The plotter returned a response that could not be parsed, or the run failed for an unclassified reason.",
        severity: Severity::Error,
        category: Category::Communication,
        remediation_steps: &[
            "This may indicate a firmware compatibility issue",
            "Try power cycling the plotter",
            "Check if the plotter firmware needs updating",
        ],
        recovery_actions: &[Retry, Reconnect],
        auto_detected: true,
    },
    ErrorDefinition {
        code: "PLT-X003",
        name: "Command Rejected",
        message: "Command rejected by plotter",
        detail: "The plotter firmware rejected the command.",
        severity: Severity::Error,
        category: Category::Communication,
        remediation_steps: &[
            "This may indicate invalid parameters or firmware limitations",
            "Try the operation again",
            "If the problem persists, restart the plotter",
        ],
        recovery_actions: &[Retry],
        auto_detected: true,
    },
    // Motion
    ErrorDefinition {
        code: "PLT-M001",
        name: "Homing Failed",
        message: "Failed to find home position",
        detail: "The plotter could not complete the homing cycle. The limit switches may not have been triggered.",
        severity: Severity::Error,
        category: Category::Motion,
        remediation_steps: &[
            "Check that nothing is blocking the pen carriage movement",
            "Ensure the limit switches at the home corner are not obstructed",
            "Move the carriage away from the corners by hand, then retry",
        ],
        recovery_actions: &[Retry, DisableMotors],
        auto_detected: true,
    },
    ErrorDefinition {
        code: "PLT-M002",
        name: "Motion Timeout",
        message: "Motion command took too long",
        detail: "A motion command did not complete within the expected time.",
        severity: Severity::Error,
        category: Category::Motion,
        remediation_steps: &[
            "Check that nothing is blocking the carriage movement",
            "The motors may have stalled, check belt tension",
            "Home the plotter to reset position tracking",
        ],
        recovery_actions: &[Home, Abort],
        auto_detected: true,
    },
    ErrorDefinition {
        code: "PLT-M003",
        name: "Bounds Exceeded",
        message: "Movement exceeds plotter boundaries",
        detail: "The requested movement would exceed the plotter's physical travel limits.",
        severity: Severity::Warning,
        category: Category::Motion,
        remediation_steps: &[
            "Check that the configured page size matches the loaded paper",
            "The drawing may be too large for the plotting area",
            "Scale down or reposition the design",
        ],
        recovery_actions: &[Abort],
        auto_detected: true,
    },
    // User input
    ErrorDefinition {
        code: "PLT-U001",
        name: "Pause Button Pressed",
        message: "Physical pause button pressed on plotter",
        detail: "The pause button on the plotter's controller board was pressed and the controller entered feed hold.",
        severity: Severity::Info,
        category: Category::UserInput,
        remediation_steps: &[
            "The plot has been paused, progress is kept",
            "Make any needed adjustments (paper, pen, etc.)",
            "Resume to continue from where the plot stopped",
        ],
        recovery_actions: &[Resume, Abort],
        auto_detected: true,
    },
    // Operator-reported: pen
    ErrorDefinition {
        code: "PLT-P001",
        name: "Pen Not Drawing",
        message: "Pen is not making marks on paper",
        detail: "The pen is not leaving ink on the paper when lowered.",
        severity: Severity::Warning,
        category: Category::Pen,
        remediation_steps: &[
            "Check if the pen has ink by drawing on scrap paper",
            "Run the calibration pattern to adjust pen height",
            "Keep a 3-5mm gap between pen and paper when the pen is up",
            "Try a different pen",
        ],
        recovery_actions: &[UserFix, Abort],
        auto_detected: false,
    },
    ErrorDefinition {
        code: "PLT-P002",
        name: "Lines Too Faint",
        message: "Pen lines are too light or inconsistent",
        detail: "The pen is making contact but lines are too faint or broken.",
        severity: Severity::Warning,
        category: Category::Pen,
        remediation_steps: &[
            "The pen may be too high above the paper",
            "Lower the pen-down height slightly",
            "Check that the paper is flat and not curled",
        ],
        recovery_actions: &[UserFix, Abort],
        auto_detected: false,
    },
    ErrorDefinition {
        code: "PLT-P003",
        name: "Lines Too Thick",
        message: "Pen is pressing too hard, lines are smeared",
        detail: "The pen is pressing too hard into the paper causing thick or smeared lines.",
        severity: Severity::Warning,
        category: Category::Pen,
        remediation_steps: &[
            "Raise the pen-down height slightly",
            "Loosen the thumbscrew and raise the pen 1-2mm",
            "Some paper types are more susceptible to this",
        ],
        recovery_actions: &[UserFix, Abort],
        auto_detected: false,
    },
    ErrorDefinition {
        code: "PLT-P004",
        name: "Pen Not Installed",
        message: "No pen detected in holder",
        detail: "The pen holder appears to be empty.",
        severity: Severity::Warning,
        category: Category::Pen,
        remediation_steps: &[
            "Install a pen in the pen holder",
            "Secure the pen with the thumbscrew",
            "Run the calibration pattern to set pen height",
        ],
        recovery_actions: &[UserFix],
        auto_detected: false,
    },
    // Operator-reported: paper
    ErrorDefinition {
        code: "PLT-S001",
        name: "Paper Shifted",
        message: "Paper has moved during plotting",
        detail: "The paper appears to have shifted from its original position.",
        severity: Severity::Warning,
        category: Category::Paper,
        remediation_steps: &[
            "Secure paper with tape or clamps on all corners",
            "The current plot cannot be resumed accurately",
            "Consider using heavier paper stock",
        ],
        recovery_actions: &[Abort],
        auto_detected: false,
    },
    ErrorDefinition {
        code: "PLT-S002",
        name: "Beyond Paper Edge",
        message: "Plot extends beyond paper boundaries",
        detail: "The drawing extends past the edge of the paper.",
        severity: Severity::Warning,
        category: Category::Paper,
        remediation_steps: &[
            "Use larger paper or scale down the design",
            "Reposition the paper flush with the reference corner",
            "Check the page margins in the design",
        ],
        recovery_actions: &[Abort],
        auto_detected: false,
    },
    ErrorDefinition {
        code: "PLT-S003",
        name: "Paper Damaged",
        message: "Paper is wrinkled or damaged",
        detail: "The paper has become wrinkled, torn, or otherwise damaged.",
        severity: Severity::Warning,
        category: Category::Paper,
        remediation_steps: &[
            "Replace with fresh paper",
            "Ensure the paper is flat before starting",
            "Check that pen pressure is not too high",
        ],
        recovery_actions: &[Abort],
        auto_detected: false,
    },
    // Operator-reported: quality
    ErrorDefinition {
        code: "PLT-Q001",
        name: "Misaligned Output",
        message: "Output is skewed or misaligned",
        detail: "The plotted output appears skewed or offset from the expected position.",
        severity: Severity::Warning,
        category: Category::Quality,
        remediation_steps: &[
            "The output may be misaligned due to lost steps",
            "Check belt tension, belts should be taut but not overly tight",
            "Home the plotter and draw a test pattern",
            "Reduce plotting speed if skipping persists",
        ],
        recovery_actions: &[Home, Abort],
        auto_detected: false,
    },
    ErrorDefinition {
        code: "PLT-Q002",
        name: "Missing Sections",
        message: "Parts of the drawing are missing",
        detail: "Some sections of the drawing were not plotted.",
        severity: Severity::Warning,
        category: Category::Quality,
        remediation_steps: &[
            "Check if the pen ran out of ink during plotting",
            "Verify the source design is complete",
            "The plot may have been interrupted, check for errors",
        ],
        recovery_actions: &[Abort],
        auto_detected: false,
    },
    ErrorDefinition {
        code: "PLT-Q003",
        name: "Inconsistent Quality",
        message: "Line quality varies across the plot",
        detail: "Line thickness or darkness varies inconsistently.",
        severity: Severity::Warning,
        category: Category::Quality,
        remediation_steps: &[
            "Paper may not be perfectly flat, use tape to secure it",
            "Pen ink flow may be inconsistent, try a different pen",
            "Check that the plotter surface is level",
        ],
        recovery_actions: &[UserFix, Abort],
        auto_detected: false,
    },
    // Controller (GRBL-class firmware)
    ErrorDefinition {
        code: "PLT-G001",
        name: "Controller Alarm",
        message: "Controller is in alarm state",
        detail: "The motion controller raised an alarm. A limit switch was hit unexpectedly or the machine lost position.",
        severity: Severity::Error,
        category: Category::Motion,
        remediation_steps: &[
            "Check if the carriage hit a limit switch unexpectedly",
            "Ensure nothing is blocking the movement path",
            "Home the plotter to clear the alarm and re-establish position",
            "If the alarm persists, power cycle the plotter",
        ],
        recovery_actions: &[Home, Retry, Abort],
        auto_detected: true,
    },
    ErrorDefinition {
        code: "PLT-G002",
        name: "Controller Error",
        message: "Controller returned an error response",
        detail: "The motion controller rejected the command with an error code. The G-code or its parameters are invalid for this firmware.",
        severity: Severity::Error,
        category: Category::Communication,
        remediation_steps: &[
            "This may indicate invalid parameters or unsupported G-code",
            "Arc commands (G2/G3) are not supported by this firmware",
            "Home the machine first",
            "Check that coordinates are within machine limits",
        ],
        recovery_actions: &[Home, Retry],
        auto_detected: true,
    },
    ErrorDefinition {
        code: "PLT-G003",
        name: "Position Unknown",
        message: "Machine position is unknown - homing required",
        detail: "The controller does not know its current position. This happens after a power cycle, emergency stop, or alarm.",
        severity: Severity::Warning,
        category: Category::Motion,
        remediation_steps: &[
            "Home the plotter to establish a position reference before plotting",
            "Do not move the carriage by hand after homing",
        ],
        recovery_actions: &[Home],
        auto_detected: true,
    },
    ErrorDefinition {
        code: "PLT-G004",
        name: "Hard Limit",
        message: "Hard limit switch triggered",
        detail: "A limit switch was triggered during movement. Position may be lost and re-homing is required.",
        severity: Severity::Error,
        category: Category::Motion,
        remediation_steps: &[
            "This usually means the plot exceeded machine boundaries",
            "Check that the design fits within the plotting area",
            "Home the plotter to unlock and re-establish position",
            "You may need to restart the plot",
        ],
        recovery_actions: &[Home, Abort],
        auto_detected: true,
    },
    ErrorDefinition {
        code: "PLT-G005",
        name: "Soft Limit",
        message: "Movement exceeds soft limits",
        detail: "The requested movement would exceed the machine's configured soft limits. The position is retained.",
        severity: Severity::Warning,
        category: Category::Motion,
        remediation_steps: &[
            "The current position has been retained",
            "Check that the design fits within the plotting area",
            "Scale down or reposition the design",
        ],
        recovery_actions: &[Abort],
        auto_detected: true,
    },
];

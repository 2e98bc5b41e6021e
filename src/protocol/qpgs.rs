use crate::error::Error;

use serde::{Serialize, Serializer};

/// Space separated fields in a `QPGSn` response.
pub const FIELD_COUNT: usize = 27;

/// Single-character flags packed into field 19.
pub const STATUS_FLAG_COUNT: usize = 8;

/// Declares a closed lookup table parsed from a wire code.
///
/// Codes the table doesn't know become `Unknown` and render as an empty
/// string, so an unexpected value never fails the whole record.
macro_rules! code_table {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $code:literal => $text:literal,)+ }) => {
        $(#[$meta])*
        #[derive(PartialEq, Eq, Clone, Copy, Debug)]
        pub enum $name {
            $($variant,)+
            Unknown,
        }

        impl $name {
            pub fn from_code(code: &str) -> Self {
                match code {
                    $($code => Self::$variant,)+
                    _ => Self::Unknown,
                }
            }

            pub fn description(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                    Self::Unknown => "",
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str(self.description())
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.serialize_str(self.description())
            }
        }
    };
}

code_table!(OperationMode {
    PoweredOn = "P" => "Powered on",
    StandBy = "S" => "Stand-By",
    Grid = "L" => "Grid",
    OffGrid = "B" => "Off-grid",
    Fault = "F" => "Fault",
    Shutdown = "D" => "Shutdown",
});

code_table!(FaultCode {
    FanLocked = "1" => "Fan locked while inverter off",
    OverTemperature = "2" => "Over-temperature",
    BatteryVoltageHigh = "3" => "Battery voltage too high",
    BatteryVoltageLow = "4" => "Battery voltage too low",
    OutputShortCircuit = "5" => "AC output short-circuit",
    OutputVoltageHigh = "6" => "AC output voltage too high",
    OutputOverload = "7" => "AC output overload",
    BusVoltageHigh = "8" => "Internal bus voltage too high",
    BusSoftStartFailed = "9" => "Internal bus soft-start failed",
    PvOverCurrent = "10" => "PV over-current",
    PvOverVoltage = "11" => "PV over-voltage",
    ConverterOverCurrent = "12" => "Internal DC converter over-current",
    DischargeOverCurrent = "13" => "Battery discharge over-current",
    OverCurrent = "51" => "Over-current",
    BusVoltageLow = "52" => "Internal bus voltage too low",
    InverterSoftStartFailed = "53" => "Inverter soft-start failed",
    DcOverVoltage = "55" => "DC over-voltage at AC output",
    CurrentSensorFailed = "57" => "Current sensor failed",
    OutputVoltageLow = "58" => "AC Output voltage too low",
    ReverseCurrent = "60" => "Reverse-current protection active",
    FirmwareInconsistent = "71" => "Firmware version inconsistent",
    CurrentSharing = "72" => "Current sharing fault",
    CanFault = "80" => "CAN communication fault",
    HostLoss = "81" => "Host loss",
    SynchronizationLoss = "82" => "Synchronization loss",
    BatteryVoltageInconsistent = "83" => "Battery voltage detected inconsistent",
    InputInconsistent = "84" => "AC in. voltage/frequency inconsistent",
    OutputCurrentImbalance = "85" => "AC output current imbalance",
    OutputModeInconsistent = "86" => "AC output mode inconsistent",
});

code_table!(
    /// Generic on/off bit of the status field.
    Switch {
        On = "1" => "on",
        Off = "0" => "off",
    }
);

code_table!(
    /// Two bits of the status field, read together.
    BatteryStatus {
        Normal = "00" => "Battery voltage normal",
        Low = "01" => "Battery voltage low",
        Disconnected = "02" => "Battery disconnected",
        BmsDisabled = "03" => "Battery charging and discharging disabled by battery attached to BMS port of unit",
    }
);

code_table!(GridAvailability {
    Connected = "0" => "connected",
    Disconnected = "1" => "disconnected",
});

code_table!(AcOutputMode {
    Single = "0" => "Single Any-Grid unit",
    Parallel = "1" => "Parallel output",
    Phase1 = "2" => "Phase 1 of 3-phase output",
    Phase2 = "3" => "Phase 2 of 3-phase output",
    Phase3 = "4" => "Phase 3 of 3-phase output",
});

code_table!(ChargerSourcePriority {
    SolarFirst = "1" => "Solar first",
    SolarAndUtility = "2" => "Solar and Utility",
    SolarOnly = "3" => "Solar only",
});

/// Field 19 of a `QPGSn` response, `b7b6b5b4b3b2b1b0` on the wire.
#[derive(PartialEq, Eq, Clone, Debug, Serialize)]
pub struct StatusFlags {
    #[serde(rename = "MPPT")]
    pub mppt: Switch,
    #[serde(rename = "ACCharging")]
    pub ac_charging: Switch,
    #[serde(rename = "SolarCharging")]
    pub solar_charging: Switch,
    #[serde(rename = "BatteryStatus")]
    pub battery_status: BatteryStatus,
    #[serde(rename = "ACInput")]
    pub ac_input: GridAvailability,
    #[serde(rename = "ACOutput")]
    pub ac_output: Switch,
    #[serde(rename = "Reserved")]
    pub reserved: String,
}

impl StatusFlags {
    pub fn decode(field: &str) -> Result<Self, Error> {
        let bits: Vec<char> = field.chars().collect();
        if bits.len() != STATUS_FLAG_COUNT {
            return Err(Error::StatusFieldMismatch {
                actual: bits.len(),
                expected: STATUS_FLAG_COUNT,
            });
        }

        let bit = |i: usize| bits[i].to_string();

        Ok(Self {
            mppt: Switch::from_code(&bit(0)),
            ac_charging: Switch::from_code(&bit(1)),
            solar_charging: Switch::from_code(&bit(2)),
            battery_status: BatteryStatus::from_code(&format!("{}{}", bits[3], bits[4])),
            ac_input: GridAvailability::from_code(&bit(5)),
            ac_output: Switch::from_code(&bit(6)),
            reserved: bit(7),
        })
    }

    pub fn ac_input_connected(&self) -> bool {
        self.ac_input == GridAvailability::Connected
    }

    pub fn ac_output_on(&self) -> bool {
        self.ac_output == Switch::On
    }
}

/// Response to `QPGS<n>`, the parallel status of one inverter.
///
/// Measurements stay strings so the device's zero padding survives into the
/// published JSON.
#[derive(PartialEq, Eq, Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatusRecord {
    #[serde(rename = "InverterNumber")]
    pub inverter_index: u8,
    pub other_units: bool,
    pub serial_number: String,
    pub operation_mode: OperationMode,
    pub fault_code: FaultCode,
    #[serde(rename = "ACInputVoltage")]
    pub ac_input_voltage: String,
    #[serde(rename = "ACInputFrequency")]
    pub ac_input_frequency: String,
    #[serde(rename = "ACOutputVoltage")]
    pub ac_output_voltage: String,
    #[serde(rename = "ACOutputFrequency")]
    pub ac_output_frequency: String,
    #[serde(rename = "ACOutputApparentPower")]
    pub ac_output_apparent_power: String,
    #[serde(rename = "ACOutputActivePower")]
    pub ac_output_active_power: String,
    pub percentage_of_nominal_output_power: String,
    pub battery_voltage: String,
    pub battery_charging_current: String,
    pub battery_state_of_charge: String,
    #[serde(rename = "PVInputVoltage")]
    pub pv_input_voltage: String,
    pub total_charging_current: String,
    #[serde(rename = "TotalACOutputApparentPower")]
    pub total_ac_output_apparent_power: String,
    #[serde(rename = "TotalACOutputActivePower")]
    pub total_ac_output_active_power: String,
    pub total_percentage_of_nominal_output_power: String,
    #[serde(rename = "InverterStatus")]
    pub status_flags: StatusFlags,
    #[serde(rename = "ACOutputMode")]
    pub ac_output_mode: AcOutputMode,
    pub battery_charger_source_priority: ChargerSourcePriority,
    pub max_charging_current_set: String,
    pub max_charging_current_possible: String,
    #[serde(rename = "MaxACChargingCurrentSet")]
    pub max_ac_charging_current_set: String,
    #[serde(rename = "PVInputCurrent")]
    pub pv_input_current: String,
    pub battery_discharge_current: String,
    pub checksum: String,
}

impl StatusRecord {
    /// Decodes a verified frame. `inverter_index` is the unit that was
    /// polled; the frame itself doesn't say.
    pub fn decode(frame: &[u8], inverter_index: u8) -> Result<Self, Error> {
        if frame.is_empty() {
            return Err(Error::EmptyInput);
        }

        let text = String::from_utf8_lossy(crate::crc::strip_trailer(frame));
        let fields: Vec<&str> = text.split(' ').collect();
        if fields.len() != FIELD_COUNT {
            return Err(Error::FieldCountMismatch {
                actual: fields.len(),
                expected: FIELD_COUNT,
            });
        }

        let field = |i: usize| fields[i].to_owned();
        let first = fields[0].trim_matches(super::MARKER);
        let status_flags = StatusFlags::decode(fields[19])?;

        Ok(Self {
            inverter_index,
            other_units: first == "1",
            serial_number: field(1),
            operation_mode: OperationMode::from_code(fields[2]),
            fault_code: FaultCode::from_code(fields[3]),
            ac_input_voltage: field(4),
            ac_input_frequency: field(5),
            ac_output_voltage: field(6),
            ac_output_frequency: field(7),
            ac_output_apparent_power: field(8),
            ac_output_active_power: field(9),
            percentage_of_nominal_output_power: field(10),
            battery_voltage: field(11),
            battery_charging_current: field(12),
            battery_state_of_charge: field(13),
            pv_input_voltage: field(14),
            total_charging_current: field(15),
            total_ac_output_apparent_power: field(16),
            total_ac_output_active_power: field(17),
            total_percentage_of_nominal_output_power: field(18),
            status_flags,
            ac_output_mode: AcOutputMode::from_code(fields[20]),
            battery_charger_source_priority: ChargerSourcePriority::from_code(fields[21]),
            max_charging_current_set: field(22),
            max_charging_current_possible: field(23),
            max_ac_charging_current_set: field(24),
            pv_input_current: field(25),
            battery_discharge_current: field(26),
            checksum: super::checksum_hex(frame),
        })
    }

    pub fn to_json(record: Option<&Self>) -> Result<String, Error> {
        Ok(serde_json::to_string(&record)?)
    }
}

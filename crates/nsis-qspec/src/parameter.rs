//! QSPEC parameters: the leaf level of the PDU / object / parameter
//! three-level nesting.
//!
//! Every parameter starts with a 32-bit header: a 4-bit flags nibble
//! (Mandatory, Error, Not-supported, reserved — in that bit order from the
//! top), a 12-bit parameter id, and a 12-bit length counted in 32-bit words
//! and *excluding* the header word itself. The reserved flag bit is ignored
//! on decode, never rejected.

use nsis_buf::NetBuf;
use nsis_ie::Registry;

use crate::error::QspecError;

/// Parameter id assignments, carried from the reference QSPEC template so
/// wire bytes match the original protocol.
pub mod param_id {
    /// Token bucket traffic model (collapses the original TMOD-1/TMOD-2
    /// pair into one parameter id; see [`crate::parameter::QspecParameter::Tmod`]).
    pub const TMOD: u16 = 1;
    /// Path latency, in microseconds.
    pub const PATH_LATENCY: u16 = 3;
    /// Path jitter, four opaque u32 components.
    pub const PATH_JITTER: u16 = 4;
    /// Path packet loss ratio.
    pub const PATH_PLR: u16 = 5;
    /// Path packet error ratio (mirrors [`PATH_PLR`]'s layout).
    pub const PATH_PER: u16 = 6;
    /// Slack term, in microseconds.
    pub const SLACK_TERM: u16 = 7;
    /// Preemption / defending priority pair.
    pub const PREEMPTION_PRIORITY: u16 = 8;
    /// Admission priority (Y.2171-coupled).
    pub const ADMISSION_PRIORITY: u16 = 9;
    /// Resource-Priority-Header namespace/priority pair.
    pub const RPH_PRIORITY: u16 = 10;
    /// Excess traffic treatment.
    pub const EXCESS_TREATMENT: u16 = 11;
    /// Per-Hop-Behavior class (DSCP or PHB-ID form).
    pub const PHB_CLASS: u16 = 12;
    /// Diffserv-aware MPLS traffic-engineering class type.
    pub const DSTE_CLASS_TYPE: u16 = 13;
    /// Y.1541 QoS class.
    pub const Y1541_QOS_CLASS: u16 = 14;
}

/// The four flag bits carried by every parameter header. The reserved bit
/// has no accessor: it is read past and always written as zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParamFlags {
    /// QNE that does not understand this parameter must reject the message.
    pub mandatory: bool,
    /// Set by a QNE that detected an error while processing this parameter.
    pub error: bool,
    /// Set by a QNE that recognised but could not honour this parameter.
    pub not_supported: bool,
}

impl ParamFlags {
    fn from_nibble(nibble: u8) -> Self {
        Self {
            mandatory: nibble & 0b1000 != 0,
            error: nibble & 0b0100 != 0,
            not_supported: nibble & 0b0010 != 0,
        }
    }

    fn to_nibble(self) -> u8 {
        (u8::from(self.mandatory) << 3) | (u8::from(self.error) << 2) | (u8::from(self.not_supported) << 1)
    }
}

#[derive(Debug, Clone, Copy)]
struct ParamHeader {
    flags: ParamFlags,
    parameter_id: u16,
    length_words: u16,
}

impl ParamHeader {
    fn parse(word: u32) -> Self {
        Self {
            flags: ParamFlags::from_nibble(((word >> 28) & 0xF) as u8),
            parameter_id: ((word >> 16) & 0x0FFF) as u16,
            length_words: (word & 0x0FFF) as u16,
        }
    }

    fn pack(self) -> u32 {
        (u32::from(self.flags.to_nibble()) << 28)
            | (u32::from(self.parameter_id & 0x0FFF) << 16)
            | u32::from(self.length_words & 0x0FFF)
    }
}

/// All valid excess-treatment actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExcessTreatment {
    /// Drop excess traffic.
    Drop,
    /// Shape excess traffic.
    Shape,
    /// Remark excess traffic to a given DSCP.
    Remark,
    /// Do not meter or police excess traffic.
    NoMetering,
}

impl ExcessTreatment {
    fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Drop),
            1 => Some(Self::Shape),
            2 => Some(Self::Remark),
            3 => Some(Self::NoMetering),
            _ => None,
        }
    }

    fn to_raw(self) -> u8 {
        match self {
            Self::Drop => 0,
            Self::Shape => 1,
            Self::Remark => 2,
            Self::NoMetering => 3,
        }
    }
}

/// Y.2171-coupled admission priority value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionPriorityValue {
    /// Best-effort priority flow (0).
    BestEffort,
    /// Normal priority flow (1).
    Normal,
    /// High priority flow (2).
    High,
    /// A locally significant priority outside the Y.2171 scale (0xFF).
    Other,
}

impl AdmissionPriorityValue {
    fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::BestEffort),
            1 => Some(Self::Normal),
            2 => Some(Self::High),
            0xFF => Some(Self::Other),
            _ => None,
        }
    }

    fn to_raw(self) -> u8 {
        match self {
            Self::BestEffort => 0,
            Self::Normal => 1,
            Self::High => 2,
            Self::Other => 0xFF,
        }
    }
}

/// The PHB class parameter's single 16-bit field, which can name either a
/// DSCP or a full PHB-ID, each either as a single value or a set marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhbValue {
    /// A single 6-bit Differentiated Services Code Point.
    Dscp(u8),
    /// A DSCP set (the actual codepoints are carried out of band).
    DscpSet(u8),
    /// A single 12-bit PHB-ID.
    PhbId(u16),
    /// A PHB-ID set (the actual ids are carried out of band).
    PhbIdSet(u16),
}

impl PhbValue {
    fn from_field(field: u16) -> Self {
        match field & 0b11 {
            0b00 => Self::Dscp((field >> 10) as u8),
            0b10 => Self::DscpSet((field >> 10) as u8),
            0b01 => Self::PhbId(field >> 4),
            _ => Self::PhbIdSet(field >> 4),
        }
    }

    fn to_field(self) -> u16 {
        match self {
            Self::Dscp(v) => (u16::from(v) & 0x3F) << 10,
            Self::DscpSet(v) => ((u16::from(v) & 0x3F) << 10) | 0b10,
            Self::PhbId(v) => (v & 0xFFF) << 4 | 0b01,
            Self::PhbIdSet(v) => (v & 0xFFF) << 4 | 0b11,
        }
    }
}

/// One decoded QSPEC parameter, tagged by the concrete type its
/// `parameter_id` named. `Raw` carries anything no variant above matches.
#[derive(Debug, Clone, PartialEq)]
pub enum QspecParameter {
    /// Token bucket traffic model: rate, bucket depth, peak data rate (all
    /// non-negative finite, peak rate may be `+∞`), and minimum policed
    /// unit in bytes.
    Tmod {
        /// Header flags.
        flags: ParamFlags,
        /// Token bucket rate, bytes per second.
        rate: f32,
        /// Token bucket depth, bytes.
        bucket_depth: f32,
        /// Peak data rate, bytes per second (`f32::INFINITY` allowed).
        peak_data_rate: f32,
        /// Minimum policed unit, bytes.
        min_policed_unit: u32,
    },
    /// End-to-end path latency.
    PathLatency {
        /// Header flags.
        flags: ParamFlags,
        /// Latency in microseconds.
        microseconds: u32,
    },
    /// End-to-end path jitter, four opaque components (the original leaves
    /// their interpretation to the QSPEC profile in use).
    PathJitter {
        /// Header flags.
        flags: ParamFlags,
        /// The four raw jitter components, in wire order.
        components: [u32; 4],
    },
    /// End-to-end path packet loss ratio.
    PathPlr {
        /// Header flags.
        flags: ParamFlags,
        /// Loss ratio as a non-negative finite fraction.
        ratio: f32,
    },
    /// End-to-end path packet error ratio (same layout as `PathPlr`).
    PathPer {
        /// Header flags.
        flags: ParamFlags,
        /// Error ratio as a non-negative finite fraction.
        ratio: f32,
    },
    /// Slack term, in microseconds.
    SlackTerm {
        /// Header flags.
        flags: ParamFlags,
        /// Slack in microseconds.
        microseconds: u32,
    },
    /// Preemption and defending priority pair, opaque 16-bit values.
    PreemptionPriority {
        /// Header flags.
        flags: ParamFlags,
        /// This reservation's preemption priority.
        preemption_priority: u16,
        /// The priority this reservation defends against preemption by.
        defending_priority: u16,
    },
    /// Admission priority, coupled to the Y.2171 scale.
    AdmissionPriority {
        /// Header flags.
        flags: ParamFlags,
        /// The Y.2171-scale value.
        value: AdmissionPriorityValue,
        /// The locally significant value. Authoritative when `value` is
        /// `Other` (Y.2171 = 0xFF); otherwise must equal `value.to_raw()`.
        local: u8,
    },
    /// Resource-Priority-Header namespace and priority.
    RphPriority {
        /// Header flags.
        flags: ParamFlags,
        /// RPH namespace identifier.
        namespace: u16,
        /// RPH priority within that namespace.
        priority: u8,
    },
    /// Treatment applied to traffic in excess of the reservation.
    ExcessTreatment {
        /// Header flags.
        flags: ParamFlags,
        /// The treatment action.
        treatment: ExcessTreatment,
        /// DSCP to remark to, meaningful only when `treatment` is `Remark`.
        remark_dscp: u8,
    },
    /// Per-Hop-Behavior class.
    PhbClass {
        /// Header flags.
        flags: ParamFlags,
        /// The PHB value, DSCP or PHB-ID form.
        value: PhbValue,
    },
    /// Diffserv-aware MPLS traffic-engineering class type (0-7).
    DsteClassType {
        /// Header flags.
        flags: ParamFlags,
        /// The class type value.
        class_type: u8,
    },
    /// Y.1541 QoS class (0-7, plus the 'unspecified' value 8).
    Y1541QosClass {
        /// Header flags.
        flags: ParamFlags,
        /// The QoS class value.
        class: u8,
    },
    /// A parameter whose id has no decoder registered. The body is kept
    /// verbatim so it can be re-serialised unchanged.
    Raw {
        /// Header flags.
        flags: ParamFlags,
        /// The undecoded parameter id.
        parameter_id: u16,
        /// The raw body bytes, not including padding.
        body: Vec<u8>,
    },
}

impl QspecParameter {
    /// The wire parameter id this value would encode as.
    #[must_use]
    pub fn parameter_id(&self) -> u16 {
        match self {
            Self::Tmod { .. } => param_id::TMOD,
            Self::PathLatency { .. } => param_id::PATH_LATENCY,
            Self::PathJitter { .. } => param_id::PATH_JITTER,
            Self::PathPlr { .. } => param_id::PATH_PLR,
            Self::PathPer { .. } => param_id::PATH_PER,
            Self::SlackTerm { .. } => param_id::SLACK_TERM,
            Self::PreemptionPriority { .. } => param_id::PREEMPTION_PRIORITY,
            Self::AdmissionPriority { .. } => param_id::ADMISSION_PRIORITY,
            Self::RphPriority { .. } => param_id::RPH_PRIORITY,
            Self::ExcessTreatment { .. } => param_id::EXCESS_TREATMENT,
            Self::PhbClass { .. } => param_id::PHB_CLASS,
            Self::DsteClassType { .. } => param_id::DSTE_CLASS_TYPE,
            Self::Y1541QosClass { .. } => param_id::Y1541_QOS_CLASS,
            Self::Raw { parameter_id, .. } => *parameter_id,
        }
    }

    /// The header flags this parameter was decoded with, or would encode
    /// with.
    #[must_use]
    pub fn flags(&self) -> ParamFlags {
        match self {
            Self::Tmod { flags, .. }
            | Self::PathLatency { flags, .. }
            | Self::PathJitter { flags, .. }
            | Self::PathPlr { flags, .. }
            | Self::PathPer { flags, .. }
            | Self::SlackTerm { flags, .. }
            | Self::PreemptionPriority { flags, .. }
            | Self::AdmissionPriority { flags, .. }
            | Self::RphPriority { flags, .. }
            | Self::ExcessTreatment { flags, .. }
            | Self::PhbClass { flags, .. }
            | Self::DsteClassType { flags, .. }
            | Self::Y1541QosClass { flags, .. }
            | Self::Raw { flags, .. } => *flags,
        }
    }

    /// Validate this parameter's body against its concrete type's rules.
    /// Returns the violation detail on failure; the caller wraps it into a
    /// [`QspecError::PduSyntax`] with its own offset.
    fn check(&self) -> Result<(), &'static str> {
        fn finite_non_negative(v: f32, allow_inf: bool) -> bool {
            // `-0.0 < 0.0` is false, so negative zero (which serialisation
            // masks away anyway) is accepted here; only genuinely negative
            // magnitudes, NaN, and (outside `allow_inf`) infinities fail.
            if v.is_nan() || v < 0.0 {
                return false;
            }
            v.is_finite() || (allow_inf && v == f32::INFINITY)
        }

        match self {
            Self::Tmod { rate, bucket_depth, peak_data_rate, .. } => {
                if !finite_non_negative(*rate, false) {
                    return Err("TMOD rate must be non-negative and finite");
                }
                if !finite_non_negative(*bucket_depth, false) {
                    return Err("TMOD bucket depth must be non-negative and finite");
                }
                if !finite_non_negative(*peak_data_rate, true) {
                    return Err("TMOD peak data rate must be non-negative, finite or +inf");
                }
                Ok(())
            }
            Self::PathPlr { ratio, .. } | Self::PathPer { ratio, .. } => {
                if !finite_non_negative(*ratio, false) {
                    return Err("path loss/error ratio must be non-negative and finite");
                }
                Ok(())
            }
            Self::AdmissionPriority { value, local, .. } => {
                if matches!(value, AdmissionPriorityValue::Other) || *local == value.to_raw() {
                    Ok(())
                } else {
                    Err("admission priority local value must equal the Y.2171 value unless Y.2171 is 0xFF")
                }
            }
            Self::PhbClass { value, .. } => match value {
                PhbValue::Dscp(v) | PhbValue::DscpSet(v) if *v > 0x3F => {
                    Err("PHB class DSCP value must fit in 6 bits")
                }
                PhbValue::PhbId(v) | PhbValue::PhbIdSet(v) if *v > 0xFFF => {
                    Err("PHB class PHB-ID value must fit in 12 bits")
                }
                _ => Ok(()),
            },
            Self::DsteClassType { class_type, .. } if *class_type > 7 => {
                Err("DiffServ-aware TE class type must be 0..=7")
            }
            Self::Y1541QosClass { class, .. } if *class > 8 => Err("Y.1541 QoS class must be 0..=8"),
            _ => Ok(()),
        }
    }

    /// Total wire size (header, body, tail padding) this parameter would
    /// occupy if encoded now. Used by the enclosing object to size its own
    /// length-in-words header without re-encoding every parameter twice.
    pub(crate) fn wire_len(&self) -> usize {
        let body_len = self.encoded_body_len();
        4 + body_len + (4 - body_len % 4) % 4
    }

    fn encoded_body_len(&self) -> usize {
        match self {
            Self::Tmod { .. } => 16,
            Self::PathJitter { .. } => 16,
            Self::PathLatency { .. }
            | Self::PathPlr { .. }
            | Self::PathPer { .. }
            | Self::SlackTerm { .. }
            | Self::PreemptionPriority { .. }
            | Self::AdmissionPriority { .. }
            | Self::RphPriority { .. }
            | Self::ExcessTreatment { .. }
            | Self::PhbClass { .. } => 4,
            Self::DsteClassType { .. } | Self::Y1541QosClass { .. } => 4,
            Self::Raw { body, .. } => body.len(),
        }
    }

    fn encode_body(&self, buf: &mut NetBuf) -> Result<(), QspecError> {
        match self {
            Self::Tmod { rate, bucket_depth, peak_data_rate, min_policed_unit, .. } => {
                buf.write_f32(mask_sign(*rate))?;
                buf.write_f32(mask_sign(*bucket_depth))?;
                buf.write_f32(mask_sign(*peak_data_rate))?;
                buf.write_u32(*min_policed_unit)?;
            }
            Self::PathLatency { microseconds, .. } | Self::SlackTerm { microseconds, .. } => {
                buf.write_u32(*microseconds)?;
            }
            Self::PathJitter { components, .. } => {
                for c in components {
                    buf.write_u32(*c)?;
                }
            }
            Self::PathPlr { ratio, .. } | Self::PathPer { ratio, .. } => {
                buf.write_f32(mask_sign(*ratio))?;
            }
            Self::PreemptionPriority { preemption_priority, defending_priority, .. } => {
                buf.write_u16(*preemption_priority)?;
                buf.write_u16(*defending_priority)?;
            }
            Self::AdmissionPriority { value, local, .. } => {
                buf.write_u8(value.to_raw())?;
                buf.write_u8(*local)?;
                buf.write_u16(0)?;
            }
            Self::RphPriority { namespace, priority, .. } => {
                buf.write_u16(*namespace)?;
                buf.write_u8(*priority)?;
                buf.write_u8(0)?;
            }
            Self::ExcessTreatment { treatment, remark_dscp, .. } => {
                buf.write_u8(treatment.to_raw())?;
                buf.write_u8((*remark_dscp & 0x3F) << 2)?;
                buf.write_u16(0)?;
            }
            Self::PhbClass { value, .. } => {
                buf.write_u16(value.to_field())?;
                buf.write_u16(0)?;
            }
            Self::DsteClassType { class_type, .. } => {
                buf.write_u8(*class_type)?;
                buf.write_u8(0)?;
                buf.write_u16(0)?;
            }
            Self::Y1541QosClass { class, .. } => {
                buf.write_u8(*class)?;
                buf.write_u8(0)?;
                buf.write_u16(0)?;
            }
            Self::Raw { body, .. } => buf.write_bytes(body)?,
        }
        Ok(())
    }

    /// Encode this parameter (header plus body plus tail padding) into
    /// `buf`, returning the total number of bytes written.
    ///
    /// # Errors
    /// Returns [`QspecError`] if the buffer runs out of space or, in debug
    /// builds effectively, if the body fails its own [`Self::check`].
    pub fn encode(&self, buf: &mut NetBuf) -> Result<usize, QspecError> {
        self.check().map_err(|detail| QspecError::PduSyntax {
            item_id: self.parameter_id(),
            offset: buf.position(),
            detail,
        })?;

        let body_len = self.encoded_body_len();
        let length_words = (body_len as u16).div_ceil(4);
        let header = ParamHeader { flags: self.flags(), parameter_id: self.parameter_id(), length_words };

        buf.write_u32(header.pack())?;
        self.encode_body(buf)?;
        let padding = buf.pad_to_4()?;
        Ok(4 + body_len + padding)
    }
}

fn mask_sign(v: f32) -> f32 {
    if v.is_sign_negative() { 0.0 } else { v }
}

/// Build the default parameter registry: every concrete parameter type
/// above, dispatched by parameter id, with unknown ids falling back to
/// [`QspecParameter::Raw`].
#[must_use]
pub fn default_registry() -> Registry<u16, QspecParameter, QspecError> {
    Registry::new()
        .register(param_id::TMOD, |buf, _| {
            let rate = buf.read_f32()?;
            let bucket_depth = buf.read_f32()?;
            let peak_data_rate = buf.read_f32()?;
            let min_policed_unit = buf.read_u32()?;
            Ok(QspecParameter::Tmod {
                flags: ParamFlags::default(),
                rate,
                bucket_depth,
                peak_data_rate,
                min_policed_unit,
            })
        })
        .register(param_id::PATH_LATENCY, |buf, _| {
            Ok(QspecParameter::PathLatency { flags: ParamFlags::default(), microseconds: buf.read_u32()? })
        })
        .register(param_id::PATH_JITTER, |buf, _| {
            let components = [buf.read_u32()?, buf.read_u32()?, buf.read_u32()?, buf.read_u32()?];
            Ok(QspecParameter::PathJitter { flags: ParamFlags::default(), components })
        })
        .register(param_id::PATH_PLR, |buf, _| {
            Ok(QspecParameter::PathPlr { flags: ParamFlags::default(), ratio: buf.read_f32()? })
        })
        .register(param_id::PATH_PER, |buf, _| {
            Ok(QspecParameter::PathPer { flags: ParamFlags::default(), ratio: buf.read_f32()? })
        })
        .register(param_id::SLACK_TERM, |buf, _| {
            Ok(QspecParameter::SlackTerm { flags: ParamFlags::default(), microseconds: buf.read_u32()? })
        })
        .register(param_id::PREEMPTION_PRIORITY, |buf, _| {
            let preemption_priority = buf.read_u16()?;
            let defending_priority = buf.read_u16()?;
            Ok(QspecParameter::PreemptionPriority {
                flags: ParamFlags::default(),
                preemption_priority,
                defending_priority,
            })
        })
        .register(param_id::ADMISSION_PRIORITY, |buf, _| {
            let y2171_raw = buf.read_u8()?;
            let local_raw = buf.read_u8()?;
            let _reserved = buf.read_u16()?;
            let value = AdmissionPriorityValue::from_raw(y2171_raw).ok_or_else(|| QspecError::PduSyntax {
                item_id: param_id::ADMISSION_PRIORITY,
                offset: buf.position(),
                detail: "admission priority value outside the Y.2171 scale",
            })?;
            Ok(QspecParameter::AdmissionPriority { flags: ParamFlags::default(), value, local: local_raw })
        })
        .register(param_id::RPH_PRIORITY, |buf, _| {
            let namespace = buf.read_u16()?;
            let priority = buf.read_u8()?;
            let _reserved = buf.read_u8()?;
            Ok(QspecParameter::RphPriority { flags: ParamFlags::default(), namespace, priority })
        })
        .register(param_id::EXCESS_TREATMENT, |buf, _| {
            let raw = buf.read_u8()?;
            let remark_raw = buf.read_u8()?;
            let _reserved = buf.read_u16()?;
            let treatment = ExcessTreatment::from_raw(raw).ok_or_else(|| QspecError::PduSyntax {
                item_id: param_id::EXCESS_TREATMENT,
                offset: buf.position(),
                detail: "unrecognised excess treatment action",
            })?;
            Ok(QspecParameter::ExcessTreatment { flags: ParamFlags::default(), treatment, remark_dscp: remark_raw >> 2 })
        })
        .register(param_id::PHB_CLASS, |buf, _| {
            let field = buf.read_u16()?;
            let _reserved = buf.read_u16()?;
            Ok(QspecParameter::PhbClass { flags: ParamFlags::default(), value: PhbValue::from_field(field) })
        })
        .register(param_id::DSTE_CLASS_TYPE, |buf, _| {
            let class_type = buf.read_u8()?;
            let _reserved = buf.read_u8()?;
            let _reserved2 = buf.read_u16()?;
            Ok(QspecParameter::DsteClassType { flags: ParamFlags::default(), class_type })
        })
        .register(param_id::Y1541_QOS_CLASS, |buf, _| {
            let class = buf.read_u8()?;
            let _reserved = buf.read_u8()?;
            let _reserved2 = buf.read_u16()?;
            Ok(QspecParameter::Y1541QosClass { flags: ParamFlags::default(), class })
        })
        .with_fallback(|parameter_id, buf, len| {
            let body = buf.read_bytes(len)?;
            Ok(QspecParameter::Raw { flags: ParamFlags::default(), parameter_id, body })
        })
}

/// Decode one parameter (header, body, tail padding) starting at the
/// buffer's current position, using `registry` to dispatch the body.
///
/// # Errors
/// Returns [`QspecError`] on a short buffer, a misdeclared length, or a
/// body that fails its own validation.
pub fn decode_parameter(
    buf: &mut NetBuf,
    registry: &Registry<u16, QspecParameter, QspecError>,
) -> Result<QspecParameter, QspecError> {
    let header_offset = buf.position();
    let header = ParamHeader::parse(buf.peek_u32()?);
    buf.read_u32()?;

    let declared_bytes = usize::from(header.length_words) * 4;
    let body_start = buf.position();

    let mut param = registry
        .decode(header.parameter_id, buf, declared_bytes)
        .unwrap_or_else(|| {
            let body = buf.read_bytes(declared_bytes)?;
            Ok(QspecParameter::Raw { flags: header.flags, parameter_id: header.parameter_id, body })
        })?;

    match &mut param {
        QspecParameter::Tmod { flags, .. }
        | QspecParameter::PathLatency { flags, .. }
        | QspecParameter::PathJitter { flags, .. }
        | QspecParameter::PathPlr { flags, .. }
        | QspecParameter::PathPer { flags, .. }
        | QspecParameter::SlackTerm { flags, .. }
        | QspecParameter::PreemptionPriority { flags, .. }
        | QspecParameter::AdmissionPriority { flags, .. }
        | QspecParameter::RphPriority { flags, .. }
        | QspecParameter::ExcessTreatment { flags, .. }
        | QspecParameter::PhbClass { flags, .. }
        | QspecParameter::DsteClassType { flags, .. }
        | QspecParameter::Y1541QosClass { flags, .. }
        | QspecParameter::Raw { flags, .. } => *flags = header.flags,
    }

    let actual = buf.position() - body_start;
    if actual != declared_bytes {
        return Err(QspecError::WrongLength {
            item_id: header.parameter_id,
            offset: header_offset,
            declared: header.length_words,
            actual,
        });
    }

    param.check().map_err(|detail| QspecError::PduSyntax { item_id: header.parameter_id, offset: header_offset, detail })?;

    buf.pad_to_4()?;
    Ok(param)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tmod_round_trips() {
        let param = QspecParameter::Tmod {
            flags: ParamFlags { mandatory: true, error: false, not_supported: false },
            rate: 1_000_000.0,
            bucket_depth: 4096.0,
            peak_data_rate: f32::INFINITY,
            min_policed_unit: 64,
        };
        let mut buf = NetBuf::new(32);
        param.encode(&mut buf).unwrap();
        buf.set_position(0).unwrap();

        let registry = default_registry();
        let decoded = decode_parameter(&mut buf, &registry).unwrap();
        assert_eq!(decoded, param);
    }

    #[test]
    fn negative_rate_is_rejected() {
        let param = QspecParameter::Tmod {
            flags: ParamFlags::default(),
            rate: -1.0,
            bucket_depth: 0.0,
            peak_data_rate: 0.0,
            min_policed_unit: 0,
        };
        let mut buf = NetBuf::new(32);
        assert!(param.encode(&mut buf).is_err());
    }

    #[test]
    fn phb_class_dscp_set_round_trips() {
        let param = QspecParameter::PhbClass { flags: ParamFlags::default(), value: PhbValue::DscpSet(46) };
        let mut buf = NetBuf::new(16);
        param.encode(&mut buf).unwrap();
        buf.set_position(0).unwrap();
        let registry = default_registry();
        assert_eq!(decode_parameter(&mut buf, &registry).unwrap(), param);
    }

    #[test]
    fn unknown_parameter_id_falls_back_to_raw() {
        let mut buf = NetBuf::new(16);
        let header = ParamHeader { flags: ParamFlags::default(), parameter_id: 0xAAA, length_words: 1 };
        buf.write_u32(header.pack()).unwrap();
        buf.write_bytes(&[1, 2, 3, 4]).unwrap();
        buf.set_position(0).unwrap();

        let registry = default_registry();
        let decoded = decode_parameter(&mut buf, &registry).unwrap();
        assert_eq!(decoded, QspecParameter::Raw { flags: ParamFlags::default(), parameter_id: 0xAAA, body: vec![1, 2, 3, 4] });
    }

    #[test]
    fn admission_priority_rejects_out_of_scale_value() {
        let mut buf = NetBuf::new(16);
        let header = ParamHeader { flags: ParamFlags::default(), parameter_id: param_id::ADMISSION_PRIORITY, length_words: 1 };
        buf.write_u32(header.pack()).unwrap();
        buf.write_u8(5).unwrap();
        buf.write_u8(5).unwrap();
        buf.write_u16(0).unwrap();
        buf.set_position(0).unwrap();

        let registry = default_registry();
        assert!(decode_parameter(&mut buf, &registry).is_err());
    }

    #[test]
    fn admission_priority_other_preserves_authoritative_local_value() {
        let param = QspecParameter::AdmissionPriority {
            flags: ParamFlags::default(),
            value: AdmissionPriorityValue::Other,
            local: 3,
        };
        let mut buf = NetBuf::new(16);
        param.encode(&mut buf).unwrap();
        buf.set_position(0).unwrap();

        let registry = default_registry();
        let decoded = decode_parameter(&mut buf, &registry).unwrap();
        assert_eq!(decoded, param);
        if let QspecParameter::AdmissionPriority { local, .. } = decoded {
            assert_eq!(local, 3);
        }
    }

    #[test]
    fn admission_priority_rejects_mismatched_local_value() {
        let param =
            QspecParameter::AdmissionPriority { flags: ParamFlags::default(), value: AdmissionPriorityValue::Normal, local: 5 };
        let mut buf = NetBuf::new(16);
        assert!(param.encode(&mut buf).is_err());
    }
}

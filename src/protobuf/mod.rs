//! Meshtastic protobuf messages
//!
//! The client API (serial and TCP) exchanges `ToRadio` / `FromRadio` messages. Only the subset of
//! `mesh.proto` and `telemetry.proto` that the bridge reads or writes is declared here, with field
//! tags matching upstream so frames from stock firmware decode unchanged. Fields and oneof
//! variants that are not declared are skipped by prost as unknown fields.

pub mod meshtastic_generated {
    //! Hand-declared prost messages mirroring the upstream `meshtastic` package.

    /// Broadcast destination node number.
    pub const BROADCAST_ADDR: u32 = 0xFFFF_FFFF;

    /// Largest payload a single `Data` message may carry.
    pub const DATA_PAYLOAD_LEN: usize = 233;

    /// Packets from the client (us) to the radio.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ToRadio {
        #[prost(oneof = "to_radio::PayloadVariant", tags = "1, 3, 4, 7")]
        pub payload_variant: Option<to_radio::PayloadVariant>,
    }

    pub mod to_radio {
        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum PayloadVariant {
            #[prost(message, tag = "1")]
            Packet(super::MeshPacket),
            #[prost(uint32, tag = "3")]
            WantConfigId(u32),
            #[prost(bool, tag = "4")]
            Disconnect(bool),
            #[prost(message, tag = "7")]
            Heartbeat(super::Heartbeat),
        }
    }

    /// Packets from the radio to the client.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct FromRadio {
        #[prost(uint32, tag = "1")]
        pub id: u32,
        #[prost(oneof = "from_radio::PayloadVariant", tags = "2, 3, 4, 7, 8")]
        pub payload_variant: Option<from_radio::PayloadVariant>,
    }

    pub mod from_radio {
        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum PayloadVariant {
            #[prost(message, tag = "2")]
            Packet(super::MeshPacket),
            #[prost(message, tag = "3")]
            MyInfo(super::MyNodeInfo),
            #[prost(message, tag = "4")]
            NodeInfo(super::NodeInfo),
            #[prost(uint32, tag = "7")]
            ConfigCompleteId(u32),
            #[prost(bool, tag = "8")]
            Rebooted(bool),
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Heartbeat {
        #[prost(uint32, tag = "1")]
        pub nonce: u32,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct MeshPacket {
        #[prost(fixed32, tag = "1")]
        pub from: u32,
        #[prost(fixed32, tag = "2")]
        pub to: u32,
        #[prost(uint32, tag = "3")]
        pub channel: u32,
        #[prost(fixed32, tag = "6")]
        pub id: u32,
        #[prost(fixed32, tag = "7")]
        pub rx_time: u32,
        #[prost(float, tag = "8")]
        pub rx_snr: f32,
        #[prost(uint32, tag = "9")]
        pub hop_limit: u32,
        #[prost(bool, tag = "10")]
        pub want_ack: bool,
        #[prost(enumeration = "mesh_packet::Priority", tag = "11")]
        pub priority: i32,
        #[prost(int32, tag = "12")]
        pub rx_rssi: i32,
        #[prost(bool, tag = "14")]
        pub via_mqtt: bool,
        #[prost(uint32, tag = "15")]
        pub hop_start: u32,
        #[prost(oneof = "mesh_packet::PayloadVariant", tags = "4, 5")]
        pub payload_variant: Option<mesh_packet::PayloadVariant>,
    }

    pub mod mesh_packet {
        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum PayloadVariant {
            #[prost(message, tag = "4")]
            Decoded(super::Data),
            #[prost(bytes = "bytes", tag = "5")]
            Encrypted(::prost::bytes::Bytes),
        }

        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
        #[repr(i32)]
        pub enum Priority {
            Unset = 0,
            Min = 1,
            Background = 10,
            Default = 64,
            Reliable = 70,
            Ack = 120,
            Max = 127,
        }

        impl Priority {
            pub fn as_str_name(&self) -> &'static str {
                match self {
                    Priority::Unset => "UNSET",
                    Priority::Min => "MIN",
                    Priority::Background => "BACKGROUND",
                    Priority::Default => "DEFAULT",
                    Priority::Reliable => "RELIABLE",
                    Priority::Ack => "ACK",
                    Priority::Max => "MAX",
                }
            }
        }
    }

    /// Application payload of a decoded mesh packet.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Data {
        #[prost(enumeration = "PortNum", tag = "1")]
        pub portnum: i32,
        #[prost(bytes = "bytes", tag = "2")]
        pub payload: ::prost::bytes::Bytes,
        #[prost(bool, tag = "3")]
        pub want_response: bool,
        #[prost(fixed32, tag = "4")]
        pub dest: u32,
        #[prost(fixed32, tag = "5")]
        pub source: u32,
        #[prost(fixed32, tag = "6")]
        pub request_id: u32,
        #[prost(fixed32, tag = "7")]
        pub reply_id: u32,
        #[prost(fixed32, tag = "8")]
        pub emoji: u32,
        #[prost(uint32, optional, tag = "9")]
        pub bitfield: Option<u32>,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum PortNum {
        UnknownApp = 0,
        TextMessageApp = 1,
        RemoteHardwareApp = 2,
        PositionApp = 3,
        NodeinfoApp = 4,
        RoutingApp = 5,
        AdminApp = 6,
        TextMessageCompressedApp = 7,
        WaypointApp = 8,
        AudioApp = 9,
        DetectionSensorApp = 10,
        ReplyApp = 32,
        IpTunnelApp = 33,
        PaxcounterApp = 34,
        SerialApp = 64,
        StoreForwardApp = 65,
        RangeTestApp = 66,
        TelemetryApp = 67,
        ZpsApp = 68,
        SimulatorApp = 69,
        TracerouteApp = 70,
        NeighborinfoApp = 71,
        AtakPlugin = 72,
        MapReportApp = 73,
        PrivateApp = 256,
        AtakForwarder = 257,
        Max = 511,
    }

    impl PortNum {
        pub fn as_str_name(&self) -> &'static str {
            match self {
                PortNum::UnknownApp => "UNKNOWN_APP",
                PortNum::TextMessageApp => "TEXT_MESSAGE_APP",
                PortNum::RemoteHardwareApp => "REMOTE_HARDWARE_APP",
                PortNum::PositionApp => "POSITION_APP",
                PortNum::NodeinfoApp => "NODEINFO_APP",
                PortNum::RoutingApp => "ROUTING_APP",
                PortNum::AdminApp => "ADMIN_APP",
                PortNum::TextMessageCompressedApp => "TEXT_MESSAGE_COMPRESSED_APP",
                PortNum::WaypointApp => "WAYPOINT_APP",
                PortNum::AudioApp => "AUDIO_APP",
                PortNum::DetectionSensorApp => "DETECTION_SENSOR_APP",
                PortNum::ReplyApp => "REPLY_APP",
                PortNum::IpTunnelApp => "IP_TUNNEL_APP",
                PortNum::PaxcounterApp => "PAXCOUNTER_APP",
                PortNum::SerialApp => "SERIAL_APP",
                PortNum::StoreForwardApp => "STORE_FORWARD_APP",
                PortNum::RangeTestApp => "RANGE_TEST_APP",
                PortNum::TelemetryApp => "TELEMETRY_APP",
                PortNum::ZpsApp => "ZPS_APP",
                PortNum::SimulatorApp => "SIMULATOR_APP",
                PortNum::TracerouteApp => "TRACEROUTE_APP",
                PortNum::NeighborinfoApp => "NEIGHBORINFO_APP",
                PortNum::AtakPlugin => "ATAK_PLUGIN",
                PortNum::MapReportApp => "MAP_REPORT_APP",
                PortNum::PrivateApp => "PRIVATE_APP",
                PortNum::AtakForwarder => "ATAK_FORWARDER",
                PortNum::Max => "MAX",
            }
        }
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct MyNodeInfo {
        #[prost(uint32, tag = "1")]
        pub my_node_num: u32,
        #[prost(uint32, tag = "8")]
        pub reboot_count: u32,
        #[prost(uint32, tag = "11")]
        pub min_app_version: u32,
    }

    /// Entry of the radio's node database, pushed during the config handshake and on updates.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct NodeInfo {
        #[prost(uint32, tag = "1")]
        pub num: u32,
        #[prost(message, optional, tag = "2")]
        pub user: Option<User>,
        #[prost(message, optional, tag = "3")]
        pub position: Option<Position>,
        #[prost(float, tag = "4")]
        pub snr: f32,
        #[prost(fixed32, tag = "5")]
        pub last_heard: u32,
        #[prost(message, optional, tag = "6")]
        pub device_metrics: Option<DeviceMetrics>,
        #[prost(uint32, tag = "7")]
        pub channel: u32,
        #[prost(bool, tag = "8")]
        pub via_mqtt: bool,
        #[prost(uint32, optional, tag = "9")]
        pub hops_away: Option<u32>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct User {
        #[prost(string, tag = "1")]
        pub id: String,
        #[prost(string, tag = "2")]
        pub long_name: String,
        #[prost(string, tag = "3")]
        pub short_name: String,
        #[prost(bytes = "bytes", tag = "4")]
        pub macaddr: ::prost::bytes::Bytes,
        #[prost(int32, tag = "5")]
        pub hw_model: i32,
        #[prost(bool, tag = "6")]
        pub is_licensed: bool,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Position {
        #[prost(sfixed32, optional, tag = "1")]
        pub latitude_i: Option<i32>,
        #[prost(sfixed32, optional, tag = "2")]
        pub longitude_i: Option<i32>,
        #[prost(int32, optional, tag = "3")]
        pub altitude: Option<i32>,
        #[prost(fixed32, tag = "4")]
        pub time: u32,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct DeviceMetrics {
        #[prost(uint32, optional, tag = "1")]
        pub battery_level: Option<u32>,
        #[prost(float, optional, tag = "2")]
        pub voltage: Option<f32>,
        #[prost(float, optional, tag = "3")]
        pub channel_utilization: Option<f32>,
        #[prost(float, optional, tag = "4")]
        pub air_util_tx: Option<f32>,
        #[prost(uint32, optional, tag = "5")]
        pub uptime_seconds: Option<u32>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Telemetry {
        #[prost(fixed32, tag = "1")]
        pub time: u32,
        #[prost(oneof = "telemetry::Variant", tags = "2")]
        pub variant: Option<telemetry::Variant>,
    }

    pub mod telemetry {
        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum Variant {
            #[prost(message, tag = "2")]
            DeviceMetrics(super::DeviceMetrics),
        }
    }

    /// Routing control payload; the firmware uses it to report ACK/NAK for `want_ack` sends.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Routing {
        #[prost(oneof = "routing::Variant", tags = "3")]
        pub variant: Option<routing::Variant>,
    }

    pub mod routing {
        #[derive(Clone, PartialEq, ::prost::Oneof)]
        pub enum Variant {
            #[prost(enumeration = "Error", tag = "3")]
            ErrorReason(i32),
        }

        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
        #[repr(i32)]
        pub enum Error {
            None = 0,
            NoRoute = 1,
            GotNak = 2,
            Timeout = 3,
            NoInterface = 4,
            MaxRetransmit = 5,
            NoChannel = 6,
            TooLarge = 7,
            NoResponse = 8,
            DutyCycleLimit = 9,
            BadRequest = 32,
            NotAuthorized = 33,
        }

        impl Error {
            pub fn as_str_name(&self) -> &'static str {
                match self {
                    Error::None => "NONE",
                    Error::NoRoute => "NO_ROUTE",
                    Error::GotNak => "GOT_NAK",
                    Error::Timeout => "TIMEOUT",
                    Error::NoInterface => "NO_INTERFACE",
                    Error::MaxRetransmit => "MAX_RETRANSMIT",
                    Error::NoChannel => "NO_CHANNEL",
                    Error::TooLarge => "TOO_LARGE",
                    Error::NoResponse => "NO_RESPONSE",
                    Error::DutyCycleLimit => "DUTY_CYCLE_LIMIT",
                    Error::BadRequest => "BAD_REQUEST",
                    Error::NotAuthorized => "NOT_AUTHORIZED",
                }
            }
        }
    }

    /// Display name for the hardware models the bridge is commonly paired with.
    pub fn hardware_model_name(code: i32) -> String {
        let name = match code {
            0 => "UNSET",
            1 => "TLORA_V2",
            2 => "TLORA_V1",
            3 => "TLORA_V2_1_1P6",
            4 => "TBEAM",
            5 => "HELTEC_V2_0",
            6 => "TBEAM_V0P7",
            7 => "T_ECHO",
            8 => "TLORA_V1_1P3",
            9 => "RAK4631",
            10 => "HELTEC_V2_1",
            11 => "HELTEC_V1",
            12 => "LILYGO_TBEAM_S3_CORE",
            13 => "RAK11200",
            14 => "NANO_G1",
            15 => "TLORA_V2_1_1P8",
            16 => "TLORA_T3_S3",
            17 => "NANO_G1_EXPLORER",
            18 => "NANO_G2_ULTRA",
            43 => "HELTEC_V3",
            44 => "HELTEC_WSL_V3",
            255 => "PRIVATE_HW",
            other => return format!("HW_MODEL_{}", other),
        };
        name.to_string()
    }

}

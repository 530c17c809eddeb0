//! Protobuf payloads of the status service commands.

#[derive(Clone, PartialEq, prost::Message)]
pub struct DeviceInfo {
    #[prost(string, tag = "1")]
    pub dev_name: String,
    #[prost(string, tag = "2")]
    pub dev_type: String,
    #[prost(string, tag = "3")]
    pub os_ver: String,
    #[prost(string, optional, tag = "4")]
    pub brand: Option<String>,
    #[prost(string, tag = "5")]
    pub vendor_os_name: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct OnlineBusinessInfo {
    #[prost(int32, tag = "1")]
    pub notify_switch: i32,
    #[prost(int32, tag = "2")]
    pub bind_uin_notify_switch: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct RegisterInfo {
    #[prost(string, tag = "1")]
    pub guid: String,
    #[prost(bool, optional, tag = "2")]
    pub kick_pc: Option<bool>,
    #[prost(string, tag = "3")]
    pub current_version: String,
    #[prost(bool, optional, tag = "4")]
    pub is_first_register_proxy_online: Option<bool>,
    #[prost(int32, optional, tag = "5")]
    pub locale_id: Option<i32>,
    #[prost(message, optional, tag = "6")]
    pub device: Option<DeviceInfo>,
    #[prost(int32, optional, tag = "7")]
    pub set_mute: Option<i32>,
    #[prost(int32, optional, tag = "8")]
    pub register_vendor_type: Option<i32>,
    #[prost(int32, optional, tag = "9")]
    pub reg_type: Option<i32>,
    #[prost(message, optional, tag = "10")]
    pub business_info: Option<OnlineBusinessInfo>,
    #[prost(int32, optional, tag = "11")]
    pub battery_status: Option<i32>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct RegisterInfoResponse {
    #[prost(string, tag = "2")]
    pub message: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UnRegisterInfo {
    #[prost(message, optional, tag = "2")]
    pub device: Option<DeviceInfo>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SsoHeartBeat {
    #[prost(int32, tag = "1")]
    pub r#type: i32,
}

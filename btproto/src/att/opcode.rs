use num_derive::{FromPrimitive, ToPrimitive};
use strum::Display;

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, FromPrimitive, ToPrimitive)]
#[repr(u8)]
pub enum AttOpcode {
    ErrorRsp = 0x01,
    ExchangeMtuReq = 0x02,
    ExchangeMtuRsp = 0x03,
    FindInformationReq = 0x04,
    FindInformationRsp = 0x05,
    FindByTypeValueReq = 0x06,
    FindByTypeValueRsp = 0x07,
    ReadByTypeReq = 0x08,
    ReadByTypeRsp = 0x09,
    ReadReq = 0x0a,
    ReadRsp = 0x0b,
    ReadBlobReq = 0x0c,
    ReadBlobRsp = 0x0d,
    ReadByGroupTypeReq = 0x10,
    ReadByGroupTypeRsp = 0x11,
    WriteReq = 0x12,
    WriteRsp = 0x13,
    WriteCmd = 0x52,
    SignedWriteCmd = 0xd2,
    HandleValueNtf = 0x1b,
    HandleValueInd = 0x1d,
    HandleValueCfm = 0x1e,
}

pub const PRIMARY_SERVICE_UUID16: u16 = 0x2800;
pub const CHARACTERISTIC_UUID16: u16 = 0x2803;
pub const CCCD_UUID16: u16 = 0x2902;
pub const CCCD_NOTIFY_BIT: u16 = 0x0001;
pub const CCCD_INDICATE_BIT: u16 = 0x0002;

//! SeaORM entity models
//!
//! Database entities for CMR documents and their related rows

mod document;
mod event;
mod photo;
mod profile;
mod reserve;
mod signature;
mod vehicle;

pub use document::{
    Entity as DocumentEntity,
    Model as CmrDocument,
    ActiveModel as DocumentActiveModel,
    Column as DocumentColumn,
    Amount, DangerousGoods, DocumentStatus, Financials, PalletExchange, TemperatureRange,
};

pub use event::{
    Entity as EventEntity,
    Model as Event,
    ActiveModel as EventActiveModel,
    Column as EventColumn,
    EventKind,
};

pub use reserve::{
    Entity as ReserveEntity,
    Model as Reserve,
    ActiveModel as ReserveActiveModel,
    Column as ReserveColumn,
    ReserveSide,
};

pub use photo::{
    Entity as PhotoEntity,
    Model as Photo,
    ActiveModel as PhotoActiveModel,
    Column as PhotoColumn,
};

pub use signature::{
    Entity as SignatureEntity,
    Model as Signature,
    ActiveModel as SignatureActiveModel,
    Column as SignatureColumn,
    SignatureParty,
};

pub use profile::{
    Entity as ProfileEntity,
    Model as Profile,
    ActiveModel as ProfileActiveModel,
    Column as ProfileColumn,
};

pub use vehicle::{
    Entity as VehicleEntity,
    Model as Vehicle,
    ActiveModel as VehicleActiveModel,
    Column as VehicleColumn,
};

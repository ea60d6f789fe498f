//! Entity Projector (C2): a registry of per-table projection descriptors,
//! data rather than a trait hierarchy (spec §9 design note), plus the
//! transform from a raw replication row into a projected fragment ready
//! for the update executor.

use crate::error::{Result, SyncError};
use crate::normalize::{normalize_value, RawValue};
use serde_json::Value;
use std::collections::BTreeMap;

/// Where a projected row lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// Merges into the work order document's scalar header fields.
    Master,
    /// Upserted/removed by id inside a nested array field on the work
    /// order document.
    Nested(&'static str),
    /// Its own independent document in the `operating` index.
    OperatingSide,
    /// Its own independent document in the `custspecialconfig` index.
    ConfigSide,
}

pub struct ProjectorSpec {
    pub source_table: &'static str,
    pub target: Target,
    pub whitelist: &'static [&'static str],
}

macro_rules! spec {
    ($table:expr, $target:expr, [$($col:expr),* $(,)?]) => {
        ProjectorSpec { source_table: $table, target: $target, whitelist: &[$($col),*] }
    };
}

pub static REGISTRY: &[ProjectorSpec] = &[
    spec!(
        "tb_workorderinfo",
        Target::Master,
        [
            "Id", "AppCode", "SourceType", "OrderType", "CreateType", "ServiceProviderCode",
            "WorkStatus", "CustomerId", "CustomerName", "CustStoreId", "CustStoreName",
            "CustStoreCode", "PreCustStoreId", "PreCustStoreName", "CustSettleId", "CustSettleName",
            "IsCustomer", "CustCoopType", "ProCode", "ProName", "CityCode", "CityName", "AreaCode",
            "AreaName", "InstallAddress", "InstallTime", "RequiredTime", "LinkMan", "LinkTel",
            "SecondLinkTel", "SecondLinkMan", "WarehouseId", "WarehouseName", "Remark", "IsUrgent",
            "CustUniqueSign", "CreatePersonCode", "CreatePersonName", "EffectiveTime",
            "EffectiveSuccessfulTime", "CreatedById", "CreatedAt", "UpdatedById", "UpdatedAt",
            "DeletedById", "DeletedAt", "Deleted", "LastUpdateTimeStamp",
        ]
    ),
    spec!(
        "tb_workorderstatus",
        Target::Nested("StatusInfo"),
        [
            "Id", "WorkOrderId", "WorkStatus", "WorkStatusCode", "NodeCode", "StepStatus",
            "StepName", "PreStepStatus", "PreStepName", "IfUninstall", "TypeStatus",
            "SuspendStatus", "IsSwitch", "IsMixPreOrder", "ClosePersonName", "ClosePersonCode",
            "ClosedAt", "IsMigration", "AuditStatus", "Remark", "CloseReasonCode",
            "CloseReasonName", "CreatedAt", "CreatedById", "UpdatedById", "UpdatedAt",
            "DeletedById", "DeletedAt", "Deleted",
        ]
    ),
    spec!(
        "tb_workcarinfo",
        Target::Nested("CarInfo"),
        [
            "Id", "WorkOrderId", "VinNumber", "PlateNumber", "PlateColor", "EngineNumber",
            "CarModelId", "CarModelName", "CarSeriesId", "CarSeriesName", "CarBrandId",
            "CarBrandName", "CarFullName", "Color", "CarPrice", "IsNewCar", "CarType", "UserName",
            "UserTel", "UserCityCode", "UserCityName", "UserAddress", "Remark", "ShortVin",
            "ShortFourVin", "CreatedById", "CreatedAt", "UpdatedById", "UpdatedAt", "DeletedById",
            "DeletedAt", "Deleted",
        ]
    ),
    spec!(
        "tb_workserviceinfo",
        Target::Nested("ServiceInfo"),
        [
            "Id", "WorkOrderId", "ServiceType", "AreaType", "Privoder", "InstitutionCode",
            "IsSelfService", "ServiceId", "ServiceCode", "ServiceName", "WorkerId", "WorkerCode",
            "WorkerName", "IsPreInstall", "CarServiceRelation", "CompleteTime", "Remark",
            "CreatedById", "CreatedAt", "UpdatedById", "UpdatedAt", "DeletedById", "DeletedAt",
            "Deleted", "LastUpdateTimeStamp",
        ]
    ),
    spec!(
        "tb_recordinfo",
        Target::Nested("RecordInfo"),
        ["Id", "WorkOrderId", "CompleteTime", "RecordPersonCode", "RecordPersonName", "Remark", "InsertTime", "Deleted"]
    ),
    spec!(
        "tb_appointment",
        Target::Nested("AppointInfo"),
        [
            "Id", "WorkOrderId", "AppCode", "AppointType", "AppointTime", "AppointStatus",
            "AppointSource", "AppointPerson", "AppointPersonTel", "AppointAddress",
            "AppointRemark", "OrderTime", "OperatorCode", "OperatorName", "CreatedById",
            "CreatedAt", "UpdatedById", "UpdatedAt", "DeletedById", "DeletedAt", "Deleted",
        ]
    ),
    spec!(
        "tb_appointmentconcat",
        Target::Nested("ConcatInfo"),
        [
            "Id", "WorkOrderId", "FirstAppointTime", "FirstSubmitTime", "CorrectiveAppointTime",
            "LastRemark", "AppCode", "AppointStatus", "LastAppointTime", "RemarkConcat",
            "CustRemarkConcat", "CallRemarkConcat", "ApplyReason", "ApplyCode", "CreatedById",
            "CreatedAt", "UpdatedById", "UpdatedAt", "DeletedById", "DeletedAt", "Deleted",
        ]
    ),
    spec!(
        "tb_workbussinessjsoninfo",
        Target::Nested("JsonInfo"),
        ["Id", "WorkOrderId", "JsonType", "JsonContent", "CreatedAt", "CreatedById", "UpdatedById", "UpdatedAt", "DeletedById", "DeletedAt", "Deleted"]
    ),
    spec!(
        "tb_custcolumn",
        Target::Nested("ColumnInfo"),
        ["Id", "WorkOrderId", "TypeCode", "TypeName", "Value", "InsertTime", "Deleted"]
    ),
    spec!(
        "tb_worksignininfo",
        Target::Nested("SigninInfo"),
        [
            "Id", "WorkOrderId", "OrgCode", "SignType", "SignTime", "SignLng", "SignLat",
            "SignAddr", "OriginalAddr", "SignAddrDistance", "LastSignDistance", "InitialLng",
            "InitialLat", "IMEI", "Remark", "CreatedById", "CreatedAt", "UpdatedById",
            "UpdatedAt", "DeletedById", "DeletedAt", "Deleted",
        ]
    ),
    spec!(
        "tb_operatinginfo",
        Target::OperatingSide,
        [
            "Id", "WorkOrderId", "OperatorId", "OperatorName", "OperatorCode", "OperationType",
            "OperationName", "OperationTime", "OperationResult", "OperationRemark", "CreatedAt",
            "CreatedById", "UpdatedById", "UpdatedAt", "DeletedById", "DeletedAt", "Deleted",
        ]
    ),
    spec!(
        "basic_custspecialconfig",
        Target::ConfigSide,
        [
            "Id", "WorkOrderId", "CustomerId", "CustomerName", "CustStoreId", "CustStoreName",
            "ConfirmType", "ExtraJson", "CreatedById", "CreatedAt", "UpdatedById", "UpdatedAt",
            "DeletedById", "DeletedAt", "Deleted",
        ]
    ),
];

pub fn lookup(table: &str) -> Option<&'static ProjectorSpec> {
    REGISTRY.iter().find(|s| s.source_table == table)
}

/// A raw replication row: column name to raw value, as handed over by
/// the tailer/backfill for a single insert/update/delete.
pub type RawRow = BTreeMap<String, RawValue>;

/// The result of projecting one raw row through its descriptor's
/// whitelist and the value normalizer.
pub struct Projected {
    pub spec: &'static ProjectorSpec,
    /// The row's own primary key.
    pub id: String,
    /// The owning work order, when this isn't the master row itself.
    pub work_order_id: Option<String>,
    pub fields: BTreeMap<String, Value>,
}

pub fn project(table: &str, row: &RawRow) -> Result<Projected> {
    let spec = lookup(table).ok_or_else(|| SyncError::UnknownTable { table: table.to_string() })?;

    let id = row
        .get("Id")
        .map(|v| raw_to_id_string(v))
        .ok_or_else(|| SyncError::MalformedValue(format!("{table} row missing Id column")))?;

    let work_order_id = match spec.target {
        Target::Master => None,
        _ => Some(
            row.get("WorkOrderId")
                .map(raw_to_id_string)
                .ok_or_else(|| SyncError::MalformedValue(format!("{table} row missing WorkOrderId column")))?,
        ),
    };

    let mut fields = BTreeMap::new();
    for column in spec.whitelist {
        if let Some(raw) = row.get(*column) {
            fields.insert((*column).to_string(), normalize_value(column, raw));
        }
    }

    Ok(Projected { spec, id, work_order_id, fields })
}

fn raw_to_id_string(raw: &RawValue) -> String {
    match raw {
        RawValue::Int(i) => i.to_string(),
        RawValue::UInt(u) => u.to_string(),
        RawValue::Str(s) => s.trim_matches('\'').to_string(),
        RawValue::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        other => format!("{other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, RawValue)]) -> RawRow {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn unknown_table_is_rejected() {
        let r = row(&[("Id", RawValue::Int(1))]);
        assert!(matches!(project("not_a_table", &r), Err(SyncError::UnknownTable { .. })));
    }

    #[test]
    fn master_row_has_no_parent() {
        let r = row(&[("Id", RawValue::Int(7)), ("Remark", RawValue::Str("hi".into()))]);
        let p = project("tb_workorderinfo", &r).unwrap();
        assert_eq!(p.id, "7");
        assert!(p.work_order_id.is_none());
        assert_eq!(p.fields.get("Remark").unwrap(), "hi");
    }

    #[test]
    fn satellite_row_carries_parent_id() {
        let r = row(&[
            ("Id", RawValue::Int(9)),
            ("WorkOrderId", RawValue::Int(7)),
            ("WorkStatus", RawValue::Str("done".into())),
        ]);
        let p = project("tb_workorderstatus", &r).unwrap();
        assert_eq!(p.id, "9");
        assert_eq!(p.work_order_id.as_deref(), Some("7"));
        assert_eq!(p.spec.target, Target::Nested("StatusInfo"));
    }

    #[test]
    fn columns_outside_whitelist_are_dropped() {
        let r = row(&[("Id", RawValue::Int(1)), ("NotWhitelisted", RawValue::Str("x".into()))]);
        let p = project("tb_workorderinfo", &r).unwrap();
        assert!(!p.fields.contains_key("NotWhitelisted"));
    }
}

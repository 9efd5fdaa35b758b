// src/schema/catalog.rs
//
// Fixed source → artifact mappings of the star schema.

use super::mapping::ColumnMapping;

/// One raw source file and the artifact it becomes.
#[derive(Debug, Clone, Copy)]
pub struct TableSpec {
    pub source_file: &'static str,
    pub artifact: &'static str,
    pub mapping: ColumnMapping,
}

pub const UNITS: TableSpec = TableSpec {
    source_file: "Units.csv",
    artifact: "dim_unit.csv",
    mapping: ColumnMapping {
        renames: &[("Unit Name", "unit_name"), ("Description", "description")],
        drops: &[],
    },
};

pub const ITEM_GROUP: TableSpec = TableSpec {
    source_file: "ItemGroup.csv",
    artifact: "dim_item_group.csv",
    mapping: ColumnMapping {
        renames: &[
            ("Item Group Code", "item_group_code"),
            ("Item Group", "item_group"),
            ("Item Code", "item_code"),
            ("Item", "item"),
        ],
        drops: &["Factor", "CPC Code", "HS Code", "HS07 Code", "HS12 Code"],
    },
};

pub const FLAGS: TableSpec = TableSpec {
    source_file: "Flags.csv",
    artifact: "dim_flag.csv",
    mapping: ColumnMapping {
        renames: &[("Flag", "flag"), ("Description", "description")],
        drops: &[],
    },
};

pub const ELEMENTS: TableSpec = TableSpec {
    source_file: "Elements.csv",
    artifact: "dim_element.csv",
    mapping: ColumnMapping {
        renames: &[
            ("Element Code", "element_code"),
            ("Element", "element"),
            ("Unit", "unit"),
            ("Description", "description"),
        ],
        drops: &[],
    },
};

pub const COUNTRY_GROUP: TableSpec = TableSpec {
    source_file: "CountryGroup.csv",
    artifact: "dim_country_group.csv",
    mapping: ColumnMapping {
        renames: &[
            ("Country Group", "country_group"),
            ("Country", "country"),
            ("M49 Code", "m49_code"),
        ],
        drops: &[
            "Country Group Code",
            "Country Code",
            "ISO2 Code",
            "ISO3 Code",
        ],
    },
};

/// The measurement source. Read with the legacy code page, see `FactOptions`.
pub const WORLD_DATA: TableSpec = TableSpec {
    source_file: "WorldData.csv",
    artifact: "fact_world_data.csv",
    mapping: ColumnMapping {
        renames: &[
            ("Area Code (M49)", "area_code_m49"),
            ("Item Code", "item_code"),
            ("Element Code", "element_code"),
            ("Year", "year"),
            ("Unit", "unit_name"),
            ("Value", "value"),
            ("Flag", "flag_code"),
        ],
        drops: &[
            "Area Code",
            "Area",
            "Item Code (CPC)",
            "Item",
            "Element",
            "Year Code",
        ],
    },
};

/// Raw area identifier and label columns of the fact source.
pub const AREA_CODE_COLUMN: &str = "Area Code (M49)";
pub const AREA_LABEL_COLUMN: &str = "Area";
/// `area_code_m49` after mapping.
pub const FACT_AREA_COLUMN: &str = "area_code_m49";
/// Prefix the source puts in front of codes to force text typing.
pub const CODE_MARKER: char = '\'';

pub const COUNTRY_INFO_ARTIFACT: &str = "dim_country_info.csv";

/// Dimension tables that are a plain mapping of one source.
pub const DIMENSIONS: [TableSpec; 5] = [UNITS, ITEM_GROUP, FLAGS, ELEMENTS, COUNTRY_GROUP];

/// Every artifact a full run is expected to produce, in write order.
pub fn expected_artifacts() -> Vec<&'static str> {
    DIMENSIONS
        .iter()
        .map(|t| t.artifact)
        .chain([WORLD_DATA.artifact, COUNTRY_INFO_ARTIFACT])
        .collect()
}

//! Document registration
//!
//! A document type is registered once per store. Registration produces an
//! immutable `DocumentMapping` (table name, soft-delete and tenancy flags,
//! member table) shared read-only by every query against that type.

pub mod members;
pub mod registry;

pub use members::{
    ChildMember, CollectionMember, ElementMember, LocatedMember, MemberTable, MemberTableBuilder,
    QueryableMember, ValueMember, DOCUMENT_ALIAS,
};
pub use registry::DocumentRegistry;

use crate::config::{EnumStorage, StoreOptions};
use crate::value::ValueType;
use serde::de::DeserializeOwned;
use std::sync::Arc;

pub const ID_COLUMN: &str = "id";
pub const DATA_COLUMN: &str = "data";
pub const DELETED_COLUMN: &str = "mt_deleted";
pub const TENANT_COLUMN: &str = "tenant_id";

/// How rows of a document table are partitioned between tenants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TenancyStyle {
    #[default]
    Single,
    /// All tenants share the table, rows carry a `tenant_id` column
    Conjoined,
}

/// A type stored as a JSON document
pub trait Document: DeserializeOwned + Send + Sync + 'static {
    /// Describe the members queries may use
    fn configure(mapping: DocumentMappingBuilder) -> DocumentMappingBuilder;

    /// Table alias, `mt_doc_<alias>`; defaults to the lower-cased type name
    fn alias() -> String {
        short_type_name::<Self>().to_lowercase()
    }
}

pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let without_generics = full.split('<').next().unwrap_or(full);
    without_generics.rsplit("::").next().unwrap_or(without_generics)
}

/// Registered storage description of one document type
#[derive(Debug, Clone)]
pub struct DocumentMapping {
    pub document_type: String,
    pub alias: String,
    pub table_name: String,
    pub id_type: ValueType,
    pub soft_deleted: bool,
    pub tenancy: TenancyStyle,
    members: Arc<MemberTable>,
}

impl DocumentMapping {
    pub fn for_document<T: Document>(options: &StoreOptions) -> Self {
        let builder = DocumentMappingBuilder::new(short_type_name::<T>(), &T::alias(), options);
        T::configure(builder).build()
    }

    pub fn members(&self) -> &MemberTable {
        &self.members
    }

    pub fn shared_members(&self) -> Arc<MemberTable> {
        self.members.clone()
    }

    pub fn id_locator(&self) -> String {
        format!("{}.{}", DOCUMENT_ALIAS, ID_COLUMN)
    }
}

/// Builder passed to `Document::configure`
#[derive(Debug)]
pub struct DocumentMappingBuilder {
    document_type: String,
    alias: String,
    table_name: String,
    id_type: ValueType,
    soft_deleted: bool,
    tenancy: TenancyStyle,
    enum_storage: EnumStorage,
    members: MemberTableBuilder,
}

impl DocumentMappingBuilder {
    pub fn new(document_type: &str, alias: &str, options: &StoreOptions) -> Self {
        let root = format!("{}.{}", DOCUMENT_ALIAS, DATA_COLUMN);
        Self {
            document_type: document_type.to_string(),
            alias: alias.to_string(),
            table_name: options.table_name(alias),
            id_type: ValueType::Uuid,
            soft_deleted: false,
            tenancy: TenancyStyle::Single,
            enum_storage: options.enum_storage,
            members: MemberTableBuilder::new(document_type, root, 0),
        }
    }

    /// Storage type of the `id` column (defaults to uuid)
    pub fn id(mut self, id_type: ValueType) -> Self {
        self.id_type = id_type;
        self
    }

    pub fn soft_deleted(mut self) -> Self {
        self.soft_deleted = true;
        self
    }

    pub fn conjoined_tenancy(mut self) -> Self {
        self.tenancy = TenancyStyle::Conjoined;
        self
    }

    pub fn field(mut self, name: &str, value_type: ValueType) -> Self {
        self.members = self.members.field(name, value_type);
        self
    }

    pub fn duplicated(mut self, name: &str, value_type: ValueType) -> Self {
        self.members = self.members.duplicated(name, value_type);
        self
    }

    /// Enum member, stored as its name or ordinal depending on `EnumStorage`
    pub fn enumeration(self, name: &str) -> Self {
        let value_type = match self.enum_storage {
            EnumStorage::AsString => ValueType::Text,
            EnumStorage::AsInteger => ValueType::Int,
        };
        self.field(name, value_type)
    }

    pub fn child<F>(mut self, name: &str, configure: F) -> Self
    where
        F: FnOnce(MemberTableBuilder) -> MemberTableBuilder,
    {
        self.members = self.members.child(name, configure);
        self
    }

    pub fn collection(mut self, name: &str, element_type: ValueType) -> Self {
        self.members = self.members.collection(name, element_type);
        self
    }

    pub fn duplicated_collection(mut self, name: &str, element_type: ValueType) -> Self {
        self.members = self.members.duplicated_collection(name, element_type);
        self
    }

    pub fn document_collection<F>(mut self, name: &str, configure: F) -> Self
    where
        F: FnOnce(MemberTableBuilder) -> MemberTableBuilder,
    {
        self.members = self.members.document_collection(name, configure);
        self
    }

    pub fn build(self) -> DocumentMapping {
        let mut members = self.members.build();
        members.insert(
            "Id".to_string(),
            QueryableMember::Value(ValueMember {
                path: "Id".to_string(),
                value_type: self.id_type,
                json_locator: format!("{}.{} ->> 'Id'", DOCUMENT_ALIAS, DATA_COLUMN),
                typed_locator: self
                    .id_type
                    .cast(&format!("{}.{} ->> 'Id'", DOCUMENT_ALIAS, DATA_COLUMN)),
                column_locator: Some(format!("{}.{}", DOCUMENT_ALIAS, ID_COLUMN)),
            }),
        );

        DocumentMapping {
            document_type: self.document_type,
            alias: self.alias,
            table_name: self.table_name,
            id_type: self.id_type,
            soft_deleted: self.soft_deleted,
            tenancy: self.tenancy,
            members: Arc::new(members),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Invoice {
        #[allow(dead_code)]
        number: i32,
    }

    impl Document for Invoice {
        fn configure(mapping: DocumentMappingBuilder) -> DocumentMappingBuilder {
            mapping
                .field("Number", ValueType::Int)
                .enumeration("Status")
                .soft_deleted()
        }
    }

    #[test]
    fn test_mapping_for_document() {
        let mapping = DocumentMapping::for_document::<Invoice>(&StoreOptions::default());
        assert_eq!(mapping.alias, "invoice");
        assert_eq!(mapping.document_type, "Invoice");
        assert_eq!(mapping.table_name, "public.mt_doc_invoice");
        assert!(mapping.soft_deleted);
        assert_eq!(mapping.tenancy, TenancyStyle::Single);
    }

    #[test]
    fn test_id_member_uses_column() {
        let mapping = DocumentMapping::for_document::<Invoice>(&StoreOptions::default());
        let id = mapping.members().locate("Id").unwrap().as_value().unwrap();
        assert_eq!(id.locator(), "d.id");
        assert_eq!(mapping.id_locator(), "d.id");
    }

    #[test]
    fn test_enum_storage_decides_member_type() {
        let mapping = DocumentMapping::for_document::<Invoice>(&StoreOptions::default());
        let status = mapping.members().locate("Status").unwrap().as_value().unwrap();
        assert_eq!(status.value_type, ValueType::Text);

        let options = StoreOptions {
            enum_storage: EnumStorage::AsInteger,
            ..StoreOptions::default()
        };
        let mapping = DocumentMapping::for_document::<Invoice>(&options);
        let status = mapping.members().locate("Status").unwrap().as_value().unwrap();
        assert_eq!(status.locator(), "CAST(d.data ->> 'Status' as integer)");
    }

    #[test]
    fn test_short_type_name() {
        assert_eq!(short_type_name::<Invoice>(), "Invoice");
        assert_eq!(short_type_name::<Vec<String>>(), "Vec");
    }
}

use gdf_dataframe::RecordKind;
use gdf_dispatch::{register_builtin_records, registry_name};
use gdf_frame::registry;

fn main() {
    register_builtin_records();

    for kind in [RecordKind::Column, RecordKind::Meta, RecordKind::Eof].iter() {
        let name = registry_name(*kind);
        match registry::lookup(name) {
            Some(def) => {
                println!("{} (size={}, id_field={:?})", def.name, def.size, def.id_field);
                for field in &def.fields {
                    println!(
                        "  {:<12} offset={:<4} type={:?} count={}",
                        field.name, field.offset, field.field_type.base, field.count
                    );
                }
            }
            None => println!("{}: not registered", name),
        }
    }
}

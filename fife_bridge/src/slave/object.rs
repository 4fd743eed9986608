use mlua::{MetaMethod, UserData, UserDataFields, UserDataMethods, Value};

use crate::world::{ObjectId, ObjectInfo};

/// Script-visible wrapper around a world object snapshot.
#[derive(Debug, Clone)]
pub(crate) struct LuaObject {
    info: ObjectInfo,
}

impl LuaObject {
    pub(crate) fn new(info: ObjectInfo) -> Self {
        LuaObject { info }
    }
}

impl UserData for LuaObject {
    fn add_fields<'lua, F: UserDataFields<'lua, Self>>(fields: &mut F) {
        fields.add_field_method_get("id", |_, this| Ok(this.info.id));
        fields.add_field_method_get("name", |_, this| Ok(this.info.name.clone()));
        fields.add_field_method_get("elevation", |_, this| Ok(this.info.elevation));
        fields.add_field_method_get("layer", |_, this| Ok(this.info.layer));
        fields.add_field_method_get("x", |_, this| Ok(this.info.position.x));
        fields.add_field_method_get("y", |_, this| Ok(this.info.position.y));
        fields.add_field_method_get("visual", |_, this| Ok(this.info.visual.clone()));
    }

    fn add_methods<'lua, M: UserDataMethods<'lua, Self>>(methods: &mut M) {
        methods.add_method("position", |_, this, ()| {
            Ok((this.info.position.x, this.info.position.y))
        });
        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| {
            Ok(format!("object#{} ({})", this.info.id, this.info.name))
        });
    }
}

/// Accepts either a wrapped object or a bare numeric id.
pub(crate) fn object_id(value: &Value) -> mlua::Result<ObjectId> {
    match value {
        Value::UserData(data) => Ok(data.borrow::<LuaObject>()?.info.id),
        Value::Integer(id) if *id >= 0 => Ok(*id as ObjectId),
        Value::Number(id) if *id >= 0.0 && id.fract() == 0.0 => Ok(*id as ObjectId),
        other => Err(mlua::Error::RuntimeError(format!(
            "expected a map object, got {}",
            other.type_name()
        ))),
    }
}

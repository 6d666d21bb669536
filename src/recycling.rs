//! Recycling guidance shown once a material has been confirmed.

pub const DEFAULT_GUIDANCE: &str =
    "Material no reconocido. Consulta el punto limpio más cercano para asegurar un reciclaje adecuado.";

/// Guidance for a confirmed material label. Labels must match the class
/// metadata exactly, accents included; anything else falls back to the
/// default advice.
pub fn guidance_for(material: &str) -> &'static str {
    match material {
        "PLÁSTICO" => {
            "Las botellas y envases de plástico van al contenedor amarillo. ¡Recuerda aplastarlos para ahorrar espacio!"
        }
        "METAL" => {
            "Las latas de metal (refrescos, conservas) también van al contenedor amarillo junto con los envases de plástico."
        }
        "TETRA PAK" => {
            "Los envases de Tetra Pak (leche, jugos) también van al contenedor amarillo. Asegúrate de aplastarlos."
        }
        _ => DEFAULT_GUIDANCE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_materials_have_specific_guidance() {
        for material in ["PLÁSTICO", "METAL", "TETRA PAK"] {
            let guidance = guidance_for(material);
            assert_ne!(guidance, DEFAULT_GUIDANCE, "{material} should be mapped");
            assert!(guidance.contains("contenedor amarillo"));
        }
    }

    #[test]
    fn lookup_is_accent_exact() {
        assert_eq!(guidance_for("PLASTICO"), DEFAULT_GUIDANCE);
        assert_eq!(guidance_for("plástico"), DEFAULT_GUIDANCE);
    }

    #[test]
    fn unknown_material_falls_back_to_default() {
        assert_eq!(guidance_for("VIDRIO"), DEFAULT_GUIDANCE);
        assert_eq!(guidance_for(""), DEFAULT_GUIDANCE);
    }
}

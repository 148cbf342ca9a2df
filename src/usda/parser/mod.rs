mod composition;
mod error;
mod hierarchy;
mod metadata;
mod token_ops;
mod value;

use logos::Logos;
use std::iter::Peekable;
use std::ops::Range;

use crate::usda::token::Token;

pub use error::ErrorHighlight;

/// Parser translates a list of tokens into a [`crate::sdf::Layer`].
pub struct Parser<'a> {
    iter: Peekable<logos::SpannedIter<'a, Token<'a>>>,
    source: &'a str,
    last_span: Option<Range<usize>>,
}

impl<'a> Parser<'a> {
    /// Create a new parser from source text.
    pub fn new(data: &'a str) -> Self {
        Self {
            iter: Token::lexer(data).spanned().peekable(),
            source: data,
            last_span: None,
        }
    }

    /// Returns a highlight for the most recent token span processed by the parser.
    pub fn last_error_highlight(&self) -> Option<ErrorHighlight> {
        self.last_span
            .clone()
            .and_then(|span| ErrorHighlight::from_span(self.source, span))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdf::{self, Specifier};
    use std::fs;

    fn parse(source: &str) -> sdf::Layer {
        Parser::new(source).parse().expect("layer should parse")
    }

    #[test]
    fn rejects_missing_header() {
        let err = Parser::new("def Xform \"World\" {}").parse().unwrap_err();
        assert!(format!("{err:#}").contains("#usda"));
    }

    #[test]
    fn parse_layer_metadata() {
        let layer = parse(
            r#"
            #usda 1.0
            (
                "layer documentation"
                upAxis = "Y"
                metersPerUnit = 0.01
                defaultPrim = "World"
                customLayerData = {
                    dictionary renderSettings = {
                        bool "rtx:raytracing:fractionalCutoutOpacity" = 1
                        token "rtx:rendermode" = "PathTracing"
                    }
                }
            )
            "#,
        );

        assert_eq!(layer.default_prim(), Some("World"));
        assert_eq!(layer.info("metersPerUnit"), Some(&sdf::Value::Double(0.01)));
        assert_eq!(
            layer.info("documentation").and_then(sdf::Value::as_text),
            Some("layer documentation")
        );

        let Some(sdf::Value::Dictionary(custom)) = layer.info("customLayerData") else {
            panic!("customLayerData should be a dictionary");
        };
        let Some(sdf::Value::Dictionary(render)) = custom.get("renderSettings") else {
            panic!("renderSettings should be a dictionary");
        };
        assert!(render.contains_key("rtx:raytracing:fractionalCutoutOpacity"));
        assert!(render.contains_key("rtx:rendermode"));
    }

    #[test]
    fn parse_sublayers_with_offsets() {
        let layer = parse(
            r#"#usda 1.0
(
    subLayers = [
        @./anim.usda@ (offset = 10; scale = 2),
        @./model.usda@
    ]
)
"#,
        );

        assert_eq!(layer.sub_layer_paths(), vec!["./anim.usda", "./model.usda"]);
        assert!(layer.info("subLayerOffsets").is_some());
    }

    #[test]
    fn parse_prim_hierarchy() {
        let layer = parse(
            r#"#usda 1.0

def Xform "World" (
    kind = "assembly"
)
{
    over "Child" {
        custom uniform token[] xformOpOrder = ["xformOp:translate"]
        double3 xformOp:translate.timeSamples = {
            0: (0, 0, 0),
            24: (1, 2, 3),
        }
        rel material:binding = </World/Looks/Mat>
    }
    class "Base" {}
}
"#,
        );

        let world = &layer.root_prims()[0];
        assert_eq!(world.path, "/World");
        assert_eq!(world.type_name(), "Xform");
        assert_eq!(
            world.metadata.get("kind").and_then(sdf::Value::as_text),
            Some("assembly")
        );

        let child = &world.children[0];
        assert_eq!(child.path, "/World/Child");
        assert_eq!(child.specifier, Specifier::Over);
        assert_eq!(child.attributes.len(), 2);
        assert!(matches!(
            child.attributes[1].metadata.get("timeSamples"),
            Some(sdf::Value::TimeSamples(samples)) if samples.len() == 2
        ));
        assert_eq!(world.children[1].specifier, Specifier::Class);
    }

    #[test]
    fn parse_asset_attributes() {
        let layer = parse(
            r#"#usda 1.0
def Material "Mat" {
    def Shader "Diffuse" {
        uniform token info:id = "UsdUVTexture"
        asset inputs:file = @textures/diffuse.png@ (
            colorSpace = "sRGB"
        )
        float2 inputs:st.connect = </Mat/Reader.outputs:result>
    }
}
"#,
        );

        let shader = &layer.root_prims()[0].children[0];
        let file = shader
            .attributes
            .iter()
            .find(|a| a.name == "inputs:file")
            .expect("inputs:file attribute");
        assert!(file.is_asset());
        assert_eq!(file.asset_path(), Some("textures/diffuse.png"));
        assert_eq!(file.color_space(), Some("sRGB"));

        let st = shader
            .attributes
            .iter()
            .find(|a| a.name == "inputs:st")
            .expect("inputs:st attribute");
        assert_eq!(st.connections, vec!["/Mat/Reader.outputs:result"]);
    }

    #[test]
    fn parse_variant_sets() {
        let layer = parse(
            r#"#usda 1.0
def Xform "Asset" (
    variants = {
        string modelVariant = "variantB"
    }
    prepend variantSets = "modelVariant"
)
{
    variantSet "modelVariant" = {
        "variantA" (
            prepend references = @./a.usda@
        ) {
        }
        "variantB" {
            def "Geo" (
                payload = @./b_payload.usda@</Geo>
            ) {
            }
        }
    }
}
"#,
        );

        let asset = &layer.root_prims()[0];
        assert_eq!(asset.variant_selection("modelVariant"), Some("variantB"));
        let set = &asset.variant_sets[0];
        assert_eq!(set.variant_names(), vec!["variantA", "variantB"]);

        let a = set.variant("variantA").unwrap();
        assert_eq!(a.prim.references.prepended_items[0].asset_path, "./a.usda");

        let b = set.variant("variantB").unwrap();
        assert_eq!(b.prim.path, "/Asset{modelVariant=variantB}");
        assert_eq!(b.prim.children[0].path, "/Asset{modelVariant=variantB}/Geo");
        assert_eq!(b.prim.children[0].payloads.explicit_items[0].prim_path, "/Geo");
    }

    #[test]
    fn parse_clips_metadata() {
        let layer = parse(
            r#"#usda 1.0
def "Crowd" (
    clips = {
        dictionary default = {
            double2[] active = [(1001, 0), (1002, 1)]
            asset[] assetPaths = [@./clips/shot.1001.usd@, @./clips/shot.1002.usd@]
            asset manifestAssetPath = @./clips/manifest.usda@
            string primPath = "/Crowd"
        }
    }
)
{
}
"#,
        );

        let sets = layer.root_prims()[0].clip_sets();
        assert_eq!(sets.len(), 1);
        assert_eq!(sets[0].name, "default");
        assert_eq!(sets[0].asset_paths.len(), 2);
        assert_eq!(sets[0].manifest_asset_path.as_deref(), Some("./clips/manifest.usda"));
    }

    #[test]
    fn parse_reference_fixture() {
        let data = fs::read_to_string(concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures/reference.usda"))
            .expect("read reference fixture");
        let layer = parse(&data);

        let collection = &layer.root_prims()[0];
        assert_eq!(collection.path, "/MarbleCollection");

        let red = &collection.children[0];
        let refs = red.references.flattened();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].asset_path, "./marble.usda");
        assert_eq!(refs[0].prim_path, "/Marble");

        let green = &collection.children[1];
        assert_eq!(green.references.prepended_items.len(), 1);
        assert_eq!(green.references.prepended_items[0].layer_offset.offset, 12.0);

        let internal = &collection.children[2];
        assert_eq!(internal.references.explicit_items[0].asset_path, "");
        assert_eq!(internal.references.explicit_items[0].prim_path, "/MarbleCollection/Marble_Red");
    }

    #[test]
    fn parse_payload_fixture() {
        let data = fs::read_to_string(concat!(env!("CARGO_MANIFEST_DIR"), "/fixtures/payload.usda"))
            .expect("read payload fixture");
        let layer = parse(&data);

        let sphere1 = &layer.root_prims()[0];
        assert_eq!(sphere1.payloads.explicit_items[0].asset_path, "./sphere.usda");

        let sphere2 = &layer.root_prims()[1];
        assert_eq!(sphere2.payloads.prepended_items[0].asset_path, "./sphere.usda");
        assert_eq!(sphere2.payloads.appended_items[0].asset_path, "./sphere_lod.usda");
        assert_eq!(sphere2.payloads.flattened().len(), 2);
    }
}

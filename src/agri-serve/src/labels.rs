use std::fs;
use std::path::Path;

use log::info;

use crate::error::{Error, Result};

/// Label reported when the model's best class has no known name.
pub const UNKNOWN_PEST: &str = "Unknown Pest";

/// Class names of the pest model, in output-layer order.
pub const PEST_LABELS: [&str; 133] = [
    "erythroneura apicalis",
    "mole cricket",
    "longlegged spider mite",
    "yellow rice borer",
    "sweet potato weevil",
    "aleurocanthus spiniferus",
    "brown plant hopper",
    "panonchus citri mcgregor",
    "viteus vitifoliae",
    "grain spreader thrips",
    "phyllocoptes oleiverus ashmead",
    "grub",
    "rice gall midge",
    "flax budworm",
    "lycorma delicatula",
    "potosiabre vitarsis",
    "pseudococcus comstocki kuwana",
    "bird cherry-oataphid",
    "polyphagotars onemus latus",
    "xylotrechus",
    "ampelophaga",
    "gall fly",
    "field cricket",
    "cicadella viridis",
    "whitefly",
    "aphis citricola vander goot",
    "spilosoma obliqua",
    "sternochetus frigidus",
    "green bug",
    "white backed plant hopper",
    "sugarcane top borer",
    "dacus dorsalis(hendel)",
    "brevipoalpus lewisi mcgregor",
    "alfalfa weevil",
    "locust",
    "icerya purchasi maskell",
    "rice leaf roller",
    "rice leafhopper",
    "coconut hispine beetle",
    "mites",
    "rice stemfly",
    "jute stem weevil",
    "miridae",
    "cassava mealybug",
    "large cutworm",
    "chlumetia transversa",
    "pieris canidia",
    "black cutworm",
    "flea beetle",
    "cerodonta denticornis",
    "cutworm",
    "deporaus marginatus pascoe",
    "red pumpkin beetle",
    "sericaorient alismots chulsky",
    "cabbage army worm",
    "thrips",
    "colomerus vitis",
    "jute hairy caterpillar",
    "termite",
    "lawana imitata melichar",
    "aphids",
    "fall armyworm",
    "yellow mite",
    "limacodidae",
    "pod borer",
    "ceroplastes rubens",
    "alfalfa seed chalcid",
    "apolygus lucorum",
    "wheat phloeothrips",
    "fruit piercing moth",
    "jute red mite",
    "indigo caterpillar",
    "phyllocnistis citrella stainton",
    "corn borer",
    "stem borer",
    "legume blister beetle",
    "odontothrips loti",
    "prodenia litura",
    "bettle",
    "beet army worm",
    "yellow cutworm",
    "rice water weevil",
    "bollworm",
    "chrysomphalus aonidum",
    "jute stem girdler",
    "rice shell pest",
    "peach borer",
    "army worm",
    "leaf beetle",
    "blister beetle",
    "white margined moth",
    "therioaphis maculata buckton",
    "flea beetle",
    "unaspis yanonensis",
    "grasshopper",
    "cicadellidae",
    "jute aphid",
    "dasineura sp",
    "small brown plant hopper",
    "jute hairy",
    "tetradacus c bactrocera minax",
    "salurnis marginella guerr",
    "rice leaf caterpillar",
    "wheat blossom midge",
    "parlatoria zizyphus lucus",
    "alfalfa plant bug",
    "scirtothrips dorsalis hood",
    "parathrene regalis",
    "nipaecoccus vastalor",
    "jute stick insect",
    "red spider",
    "adristyrannus",
    "black hairy",
    "lytta polita",
    "oides decempunctata",
    "wheat sawfly",
    "trialeurodes vaporariorum",
    "sawfly",
    "penthaleus major",
    "paddy stem maggot",
    "locustoidea",
    "tarnished plant bug",
    "mealybug",
    "toxoptera aurantii",
    "jute semilooper",
    "mango flat beak leafhopper",
    "meadow moth",
    "english grain aphid",
    "papilio xuthus",
    "wire worm",
    "bactrocera tsuneonis",
    "asiatic rice borer",
    "toxoptera citricidus",
];

/// Closed set of pest names indexed by model output position.
#[derive(Clone, Debug)]
pub struct PestLabels {
    names: Vec<String>,
}

impl Default for PestLabels {
    fn default() -> Self {
        PestLabels {
            names: PEST_LABELS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl PestLabels {
    pub fn new(names: Vec<String>) -> Self {
        PestLabels { names }
    }

    /// Reads one label per line. Blank lines are kept so that indices stay
    /// aligned with the model output.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| Error::artifact(path, e))?;

        let names: Vec<String> = text.lines().map(|l| l.trim().to_owned()).collect();
        if names.iter().all(|n| n.is_empty()) {
            return Err(Error::artifact(path, "labels file is empty"));
        }

        info!("Loaded {} pest labels from {}", names.len(), path.display());

        Ok(PestLabels { names })
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn builtin_labels_follow_output_order() {
        let labels = PestLabels::default();

        assert_eq!(labels.len(), PEST_LABELS.len());
        assert_eq!(labels.get(0), Some("erythroneura apicalis"));
        assert_eq!(labels.get(132), Some("toxoptera citricidus"));
        assert_eq!(labels.get(133), None);
        assert!(labels.contains("tarnished plant bug"));
        assert!(!labels.contains(UNKNOWN_PEST));
    }

    #[test]
    fn loads_labels_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "aphids").unwrap();
        writeln!(file, "  locust ").unwrap();

        let labels = PestLabels::from_file(file.path()).unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels.get(1), Some("locust"));
    }

    #[test]
    fn rejects_empty_labels_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(
            PestLabels::from_file(file.path()),
            Err(Error::Artifact { .. })
        ));
    }
}

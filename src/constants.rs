// Model input layout
pub const SAMPLE_LENGTH: usize = 4;
pub const FEATURE_NUM: usize = 5;
pub const MODEL_INPUT_NAME: &str = "input_5";

// Feature table columns
pub const COLUMN_TIME: &str = "time";
pub const COLUMN_TIME_DIFF: &str = "time_diff";
pub const COLUMN_NOTE_NUM: &str = "note_num";
pub const COLUMN_LENGTH: &str = "length";
pub const COLUMN_NOTE_NUM_DIFF: &str = "note_num_diff";
pub const COLUMN_LOW_OCTAVE: &str = "low_octave";
pub const COLUMN_VELOCITY: &str = "velocity";

pub const COLUMNS_TRAIN: [&str; FEATURE_NUM] = [
    COLUMN_TIME_DIFF,
    COLUMN_NOTE_NUM,
    COLUMN_LENGTH,
    COLUMN_NOTE_NUM_DIFF,
    COLUMN_LOW_OCTAVE,
];
pub const COLUMNS_LABEL: [&str; 1] = [COLUMN_VELOCITY];

// External tools and artifacts
pub const MIDI2CSV_TOOL: &str = "midi2csv";
pub const CSV2MIDI_TOOL: &str = "csv2midi";
pub const PREDICTED_SUFFIX: &str = "_predicted";
pub const TOOLS_DIR: &str = "./Tools/utils";
pub const MODEL_PATH: &str = "./Tools/models/mvi-v2-2023-07-20_13-00_56-h4-e5-mse_cosine_loss-alpha0.15-m0.60-LSTM-luong_attention-MAESTRO.onnx";
pub const DATASET_METADATA_PATH: &str = "./Tools/models/dataset32-MAESTRO-len4.json";

// Upload boundary
pub const UPLOAD_DIR: &str = "./UploadedFiles";
pub const WEB_ROOT: &str = "./wwwroot";
pub const WEB_OUTPUT_DIR: &str = "output";

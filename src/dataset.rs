use std::path::Path;

use ndarray::{s, Array2, Array3, ArrayView1, ArrayView2, Axis};

use crate::error::{Error, Result};

/// Feature columns in a seizure recording row
pub const FEATURES: usize = 178;
/// Classes in the raw label column (1..=5 in the file)
pub const CLASSES: usize = 5;

/// How the label column is turned into a class index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LabelMode {
    /// zero-indexed label, `CLASSES` outputs
    #[default]
    MultiClass,
    /// 0 when the zero-indexed label equals `base`, otherwise 1
    Binary { base: usize },
}

impl LabelMode {
    pub fn classes(&self, classes: usize) -> usize {
        match self {
            LabelMode::MultiClass => classes,
            LabelMode::Binary { .. } => 2,
        }
    }
}

pub fn remap_binary(label: usize, base: usize) -> usize {
    if label == base {
        0
    } else {
        1
    }
}

/// One parsed row: features without the id column, zero-indexed label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub features: Vec<i32>,
    pub label: usize,
}

/// Reads every row after the header as raw cells.
/// Row widths are not checked here, see [`parse_records`]
pub fn read_csv(path: impl AsRef<Path>) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;
    let mut rows = vec![];
    for record in reader.records() {
        rows.push(record?.iter().map(ToString::to_string).collect());
    }
    Ok(rows)
}

/// Parses rows laid out as `id, f1..fD, label` where label is 1-based
pub fn parse_records(
    rows: &[Vec<String>],
    mode: LabelMode,
    feature_count: usize,
    classes: usize,
) -> Result<Vec<Record>> {
    rows.iter()
        .enumerate()
        .map(|(i, line)| {
            let row = i + 1;
            if line.len() != feature_count + 2 {
                return Err(Error::ColumnCount {
                    row,
                    expected: feature_count + 2,
                    found: line.len(),
                });
            }
            let features = line[1..=feature_count]
                .iter()
                .enumerate()
                .map(|(j, cell)| {
                    cell.trim().parse::<i32>().map_err(|_| Error::Parse {
                        row,
                        column: j + 1,
                        value: cell.clone(),
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            let cell = &line[feature_count + 1];
            let label = cell.trim().parse::<i64>().map_err(|_| Error::Parse {
                row,
                column: feature_count + 1,
                value: cell.clone(),
            })?;
            if label < 1 || label > classes as i64 {
                return Err(Error::Label {
                    row,
                    label,
                    classes,
                });
            }
            let label = (label - 1) as usize;
            let label = match mode {
                LabelMode::MultiClass => label,
                LabelMode::Binary { base } => remap_binary(label, base),
            };
            Ok(Record { features, label })
        })
        .collect()
}

/// First half of the rows, multi-class, flat features
pub fn load_data(rows: &[Vec<String>]) -> Result<(Vec<Vec<i32>>, Vec<usize>)> {
    let set = Dataset::builder().add_rows(rows).first_half().build()?;
    Ok(set.into_parts())
}

/// First half of the rows, binary against `base`, flat features
pub fn load_binary_data(rows: &[Vec<String>], base: usize) -> Result<(Vec<Vec<i32>>, Vec<usize>)> {
    let set = Dataset::builder()
        .add_rows(rows)
        .label_mode(LabelMode::Binary { base })
        .first_half()
        .build()?;
    Ok(set.into_parts())
}

/// All rows, multi-class, features shaped `(n, 1, D)`
pub fn load_data_nn(rows: &[Vec<String>]) -> Result<(Array3<f32>, Vec<usize>)> {
    let set = Dataset::builder().add_rows(rows).build()?;
    Ok((set.to_channels(), set.labels()))
}

/// All rows, binary against `base`, features shaped `(n, 1, D)`
pub fn load_binary_data_nn(rows: &[Vec<String>], base: usize) -> Result<(Array3<f32>, Vec<usize>)> {
    let set = Dataset::builder()
        .add_rows(rows)
        .label_mode(LabelMode::Binary { base })
        .build()?;
    Ok((set.to_channels(), set.labels()))
}

pub fn load_dataset(path: impl AsRef<Path>) -> Result<TensorDataset> {
    let (x, y) = load_data_nn(&read_csv(path)?)?;
    TensorDataset::from_channels(x, y)
}

/// binary labels against class `base`
pub fn load_dataset_binary(path: impl AsRef<Path>, base: usize) -> Result<TensorDataset> {
    let (x, y) = load_binary_data_nn(&read_csv(path)?, base)?;
    TensorDataset::from_channels(x, y)
}

/// Train and test loaders, each from its own file, with the same params
pub fn load_dataset_batch(
    train_path: impl AsRef<Path>,
    test_path: impl AsRef<Path>,
    params: LoaderParams,
) -> Result<(DataLoader, DataLoader)> {
    let train = load_dataset(train_path)?;
    let test = load_dataset(test_path)?;
    Ok((DataLoader::new(train, params), DataLoader::new(test, params)))
}

/// Parsed rows of a seizure csv.
///
/// Built from raw rows by [`DatasetBuilder`]:
///
/// ```rust
///   use seizure_nn::dataset::{Dataset, LabelMode};
///   let rows = vec![
///       vec!["a".to_string(), "1".into(), "2".into(), "3".into()],
///       vec!["b".to_string(), "4".into(), "5".into(), "1".into()],
///   ];
///   let set = Dataset::builder()
///       .add_rows(&rows)
///       .feature_count(2)
///       .label_mode(LabelMode::Binary { base: 2 })
///       .build()
///       .unwrap();
///   assert_eq!(set.labels(), vec![0, 1]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    records: Vec<Record>,
    feature_count: usize,
}

impl Dataset {
    pub fn builder() -> DatasetBuilder {
        DatasetBuilder::new()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn feature_count(&self) -> usize {
        self.feature_count
    }

    pub fn labels(&self) -> Vec<usize> {
        self.records.iter().map(|r| r.label).collect()
    }

    pub fn into_parts(self) -> (Vec<Vec<i32>>, Vec<usize>) {
        self.records
            .into_iter()
            .map(|r| (r.features, r.label))
            .unzip()
    }

    /// `(n, D)`
    pub fn to_matrix(&self) -> Array2<f32> {
        let mut x = Array2::zeros((self.len(), self.feature_count));
        for (mut row, record) in x.rows_mut().into_iter().zip(&self.records) {
            for (v, &f) in row.iter_mut().zip(&record.features) {
                *v = f as f32;
            }
        }
        x
    }

    /// `(n, 1, D)`
    pub fn to_channels(&self) -> Array3<f32> {
        self.to_matrix().insert_axis(Axis(1))
    }

    pub fn into_tensor_dataset(self) -> TensorDataset {
        TensorDataset {
            features: self.to_matrix(),
            labels: self.labels(),
        }
    }

    /// First `mid` rows and the rest
    pub fn split_at(mut self, mid: usize) -> (Dataset, Dataset) {
        let rest = self.records.split_off(mid.min(self.records.len()));
        let feature_count = self.feature_count;
        (
            self,
            Dataset {
                records: rest,
                feature_count,
            },
        )
    }
}

pub struct DatasetBuilder {
    rows: Vec<Vec<String>>,
    feature_count: usize,
    classes: usize,
    label_mode: LabelMode,
    first_half: bool,
}

impl Default for DatasetBuilder {
    fn default() -> Self {
        Self {
            rows: vec![],
            feature_count: FEATURES,
            classes: CLASSES,
            label_mode: LabelMode::MultiClass,
            first_half: false,
        }
    }
}

impl DatasetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assumes first row is column names, which it drops
    pub fn read_csv(mut self, path: impl AsRef<Path>) -> Result<Self> {
        self.rows.extend(read_csv(path)?);
        Ok(self)
    }

    /// Rows without a header
    pub fn add_rows<T: ToString>(mut self, rows: &[Vec<T>]) -> Self {
        self.rows.extend(
            rows.iter()
                .map(|x| x.iter().map(ToString::to_string).collect()),
        );
        self
    }

    /// Feature columns between the id and label columns (default 178)
    pub fn feature_count(mut self, count: usize) -> Self {
        self.feature_count = count;
        self
    }

    /// Valid labels are `1..=classes` in the file (default 5)
    pub fn classes(mut self, classes: usize) -> Self {
        self.classes = classes;
        self
    }

    pub fn label_mode(mut self, mode: LabelMode) -> Self {
        self.label_mode = mode;
        self
    }

    /// Only keep the first `len / 2` rows
    pub fn first_half(mut self) -> Self {
        self.first_half = true;
        self
    }

    pub fn build(&self) -> Result<Dataset> {
        let rows = if self.first_half {
            &self.rows[..self.rows.len() / 2]
        } else {
            &self.rows[..]
        };
        Ok(Dataset {
            records: parse_records(rows, self.label_mode, self.feature_count, self.classes)?,
            feature_count: self.feature_count,
        })
    }
}

/// Paired `f32` features and class labels with indexed access
#[derive(Debug, Clone, PartialEq)]
pub struct TensorDataset {
    features: Array2<f32>,
    labels: Vec<usize>,
}

impl TensorDataset {
    pub fn new(features: Array2<f32>, labels: Vec<usize>) -> Result<Self> {
        if features.nrows() != labels.len() {
            return Err(Error::Shape(format!(
                "{} feature rows for {} labels",
                features.nrows(),
                labels.len()
            )));
        }
        Ok(Self { features, labels })
    }

    /// Flattens `(n, channels, D)` to `(n, channels * D)`
    pub fn from_channels(features: Array3<f32>, labels: Vec<usize>) -> Result<Self> {
        let (n, c, d) = features.dim();
        let flat = Array2::from_shape_vec((n, c * d), features.iter().copied().collect())
            .map_err(|e| Error::Shape(e.to_string()))?;
        Self::new(flat, labels)
    }

    /// Same labels, replaced features e.g. after scaling
    pub fn with_features(self, features: Array2<f32>) -> Result<Self> {
        Self::new(features, self.labels)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn input_size(&self) -> usize {
        self.features.ncols()
    }

    pub fn features(&self) -> &Array2<f32> {
        &self.features
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn get(&self, index: usize) -> Option<(ArrayView1<f32>, usize)> {
        let label = *self.labels.get(index)?;
        Some((self.features.row(index), label))
    }

    /// item as a batch of one, ready for [`crate::traits::Model::forward`].
    /// Callers stay below [`TensorDataset::len`], use [`TensorDataset::get`] otherwise
    pub(crate) fn item(&self, index: usize) -> (ArrayView2<f32>, usize) {
        (
            self.features.slice(s![index..index + 1, ..]),
            self.labels[index],
        )
    }

    pub fn split_at(&self, mid: usize) -> (TensorDataset, TensorDataset) {
        let mid = mid.min(self.len());
        (
            TensorDataset {
                features: self.features.slice(s![..mid, ..]).to_owned(),
                labels: self.labels[..mid].to_vec(),
            },
            TensorDataset {
                features: self.features.slice(s![mid.., ..]).to_owned(),
                labels: self.labels[mid..].to_vec(),
            },
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderParams {
    pub batch_size: usize,
    pub shuffle: bool,
}

impl Default for LoaderParams {
    fn default() -> Self {
        Self {
            batch_size: 1,
            shuffle: false,
        }
    }
}

/// Yields `(features, labels)` batches, the last one may be smaller.
/// With `shuffle` a new order is drawn every time [`DataLoader::iter`] is called
#[derive(Debug, Clone)]
pub struct DataLoader {
    dataset: TensorDataset,
    params: LoaderParams,
}

impl DataLoader {
    pub fn new(dataset: TensorDataset, mut params: LoaderParams) -> Self {
        params.batch_size = params.batch_size.max(1);
        Self { dataset, params }
    }

    pub fn dataset(&self) -> &TensorDataset {
        &self.dataset
    }

    pub fn params(&self) -> LoaderParams {
        self.params
    }

    /// number of batches
    pub fn len(&self) -> usize {
        self.dataset.len().div_ceil(self.params.batch_size)
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    pub fn iter(&self) -> Batches<'_> {
        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        if self.params.shuffle {
            fastrand::shuffle(&mut order);
        }
        Batches {
            loader: self,
            order,
            pos: 0,
        }
    }
}

pub struct Batches<'a> {
    loader: &'a DataLoader,
    order: Vec<usize>,
    pos: usize,
}

impl Iterator for Batches<'_> {
    type Item = (Array2<f32>, Vec<usize>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.order.len() {
            return None;
        }
        let end = (self.pos + self.loader.params.batch_size).min(self.order.len());
        let indices = &self.order[self.pos..end];
        self.pos = end;
        let data = &self.loader.dataset;
        Some((
            data.features.select(Axis(0), indices),
            indices.iter().map(|&i| data.labels[i]).collect(),
        ))
    }
}

impl<'a> IntoIterator for &'a DataLoader {
    type Item = (Array2<f32>, Vec<usize>);
    type IntoIter = Batches<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

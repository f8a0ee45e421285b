use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::package::domain::certificate_chain::CertificateChain;
use crate::package::domain::composition::{AssetEntry, AssetKind, CompositionPlaylist};
use crate::package::domain::package_writer::{PackageError, PackageWriter};
use crate::package::infrastructure::digest::bytes_digest;
use crate::shared::film::Standard;
use crate::shared::xml_document::{XmlDocument, XmlError};

const DSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";

struct Namespaces {
    cpl: &'static str,
    pkl: &'static str,
    asset_map: &'static str,
    stereo: &'static str,
}

fn namespaces(standard: Standard) -> Namespaces {
    match standard {
        Standard::Smpte => Namespaces {
            cpl: "http://www.smpte-ra.org/schemas/429-7/2006/CPL",
            pkl: "http://www.smpte-ra.org/schemas/429-8/2007/PKL",
            asset_map: "http://www.smpte-ra.org/schemas/429-9/2007/AM",
            stereo: "http://www.smpte-ra.org/schemas/429-10/2008/Main-Stereo-Picture-CPL",
        },
        Standard::Interop => Namespaces {
            cpl: "http://www.digicine.com/PROTO-ASDCP-CPL-20040511#",
            pkl: "http://www.digicine.com/PROTO-ASDCP-PKL-20040311#",
            asset_map: "http://www.digicine.com/PROTO-ASDCP-AM-20040311#",
            stereo: "http://www.digicine.com/schemas/437-Y/2007/Main-Stereo-Picture-CPL",
        },
    }
}

/// The parts of an enveloped signature, computed over the unsigned document.
struct Signature {
    subject: String,
    certificate: String,
    digest: String,
    value: String,
}

/// One file listed in the packing list and asset map.
struct PackagedFile {
    id: Uuid,
    path: PathBuf,
    hash: String,
    size: u64,
    mime: &'static str,
}

/// Writes CPL, PKL, ASSETMAP and VOLINDEX documents into a package directory.
pub struct XmlPackageWriter {
    dir: PathBuf,
}

impl XmlPackageWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn write_file(&self, name: &str, bytes: &[u8]) -> Result<PathBuf, PackageError> {
        let path = self.dir.join(name);
        fs::write(&path, bytes).map_err(PackageError::io(&path))?;
        Ok(path)
    }
}

impl PackageWriter for XmlPackageWriter {
    fn prepare(&self) -> Result<(), PackageError> {
        if self.dir.exists() {
            log::info!("Removing stale package {}", self.dir.display());
            fs::remove_dir_all(&self.dir).map_err(PackageError::io(&self.dir))?;
        }
        fs::create_dir_all(&self.dir).map_err(PackageError::io(&self.dir))
    }

    fn write(
        &self,
        cpl: &CompositionPlaylist,
        signer: Option<&dyn CertificateChain>,
    ) -> Result<PathBuf, PackageError> {
        let standard = cpl.standard;
        let signed = signer.is_some();

        let cpl_bytes = signed_document(signer, |signature| cpl_xml(cpl, signed, signature))?;
        let cpl_name = format!("CPL_{}.xml", cpl.id);
        let cpl_path = self.write_file(&cpl_name, &cpl_bytes)?;

        let mut files: Vec<PackagedFile> = cpl
            .package_assets()
            .into_iter()
            .filter_map(|asset| {
                let path = asset.file.clone()?;
                Some(PackagedFile {
                    id: asset.id,
                    path,
                    hash: asset.hash.clone().unwrap_or_default(),
                    size: asset.size,
                    mime: mime_type(&asset.kind, standard),
                })
            })
            .collect();
        files.push(PackagedFile {
            id: cpl.id,
            path: PathBuf::from(&cpl_name),
            hash: bytes_digest(&cpl_bytes),
            size: cpl_bytes.len() as u64,
            mime: cpl_mime_type(standard),
        });

        let pkl_id = Uuid::new_v4();
        let pkl_bytes = signed_document(signer, |signature| {
            pkl_xml(cpl, pkl_id, &files, signed, signature)
        })?;
        let pkl_name = format!("PKL_{pkl_id}.xml");
        self.write_file(&pkl_name, &pkl_bytes)?;

        let (asset_map_name, volindex_name) = match standard {
            Standard::Interop => ("ASSETMAP", "VOLINDEX"),
            Standard::Smpte => ("ASSETMAP.xml", "VOLINDEX.xml"),
        };
        let asset_map = asset_map_xml(
            cpl,
            (pkl_id, Path::new(&pkl_name), pkl_bytes.len() as u64),
            &files,
        )?;
        self.write_file(asset_map_name, &asset_map)?;
        self.write_file(volindex_name, &volindex_xml(standard)?)?;

        log::info!(
            "Wrote {} with {} reels to {}",
            cpl_name,
            cpl.reels.len(),
            self.dir.display()
        );
        Ok(cpl_path)
    }
}

/// Builds a document and, if there is a signer, builds it again with an
/// enveloped signature over the unsigned bytes.
fn signed_document(
    signer: Option<&dyn CertificateChain>,
    build: impl Fn(Option<&Signature>) -> Result<Vec<u8>, XmlError>,
) -> Result<Vec<u8>, PackageError> {
    let unsigned = build(None)?;
    let Some(signer) = signer else {
        return Ok(unsigned);
    };
    if !signer.valid() {
        return Err(PackageError::InvalidSigner);
    }

    let signature = Signature {
        subject: signer.subject().to_string(),
        certificate: signer.certificate()?,
        digest: STANDARD.encode(Sha256::digest(&unsigned)),
        value: STANDARD.encode(signer.sign(&unsigned)?),
    };
    Ok(build(Some(&signature))?)
}

fn urn(id: Uuid) -> String {
    format!("urn:uuid:{id}")
}

fn issue_date(date: &DateTime<Utc>) -> String {
    date.format("%Y-%m-%dT%H:%M:%S+00:00").to_string()
}

fn mime_type(kind: &AssetKind, standard: Standard) -> &'static str {
    match (kind, standard) {
        (AssetKind::Picture { .. }, Standard::Interop) => {
            "application/x-smpte-mxf;asdcpKind=Picture"
        }
        (AssetKind::Sound { .. }, Standard::Interop) => "application/x-smpte-mxf;asdcpKind=Sound",
        (AssetKind::Subtitle, Standard::Interop) => "text/xml;asdcpKind=Subtitle",
        (AssetKind::Picture { .. } | AssetKind::Sound { .. }, Standard::Smpte) => "application/mxf",
        (AssetKind::Subtitle, Standard::Smpte) => "text/xml",
        (AssetKind::Font, _) => "application/ttf",
    }
}

fn cpl_mime_type(standard: Standard) -> &'static str {
    match standard {
        Standard::Interop => "text/xml;asdcpKind=CPL",
        Standard::Smpte => "text/xml",
    }
}

fn root_attributes<'a>(ns: &'a str, signed: bool) -> Vec<(&'a str, &'a str)> {
    let mut attributes = vec![("xmlns", ns)];
    if signed {
        attributes.push(("xmlns:dsig", DSIG_NS));
    }
    attributes
}

fn cpl_xml(
    cpl: &CompositionPlaylist,
    signed: bool,
    signature: Option<&Signature>,
) -> Result<Vec<u8>, XmlError> {
    let ns = namespaces(cpl.standard);
    let date = issue_date(&cpl.issue_date);
    let mut doc = XmlDocument::new()?;

    doc.start("CompositionPlaylist", &root_attributes(ns.cpl, signed))?;
    doc.text_element("Id", &urn(cpl.id))?;
    doc.text_element("AnnotationText", &cpl.annotation_text)?;
    doc.text_element("IssueDate", &date)?;
    doc.text_element("Issuer", &cpl.issuer)?;
    doc.text_element("Creator", &cpl.creator)?;
    doc.text_element("ContentTitleText", &cpl.content_title)?;
    doc.text_element("ContentKind", &cpl.content_kind.to_string())?;
    doc.start("ContentVersion", &[])?;
    doc.text_element("Id", &format!("urn:uri:{}_{}", cpl.id, date))?;
    doc.text_element("LabelText", &format!("{}_{}", cpl.id, date))?;
    doc.end("ContentVersion")?;
    doc.empty("RatingList", &[])?;

    doc.start("ReelList", &[])?;
    for reel in &cpl.reels {
        doc.start("Reel", &[])?;
        doc.text_element("Id", &urn(reel.id))?;
        doc.start("AssetList", &[])?;
        if let Some(picture) = &reel.picture {
            let stereoscopic = matches!(picture.kind, AssetKind::Picture { stereoscopic: true });
            let (name, attributes) = if stereoscopic {
                (
                    "msp-cpl:MainStereoscopicPicture",
                    vec![("xmlns:msp-cpl", ns.stereo)],
                )
            } else {
                ("MainPicture", vec![])
            };
            doc.start(name, &attributes)?;
            reel_asset_body(&mut doc, picture)?;
            let rate = format!("{} 1", picture.edit_rate);
            doc.text_element("FrameRate", &rate)?;
            let aspect = match cpl.standard {
                Standard::Smpte => "1998 1080",
                Standard::Interop => "1.85",
            };
            doc.text_element("ScreenAspectRatio", aspect)?;
            doc.end(name)?;
        }
        if let Some(sound) = &reel.sound {
            doc.start("MainSound", &[])?;
            reel_asset_body(&mut doc, sound)?;
            doc.end("MainSound")?;
        }
        if let Some(subtitle) = &reel.subtitle {
            doc.start("MainSubtitle", &[])?;
            reel_asset_body(&mut doc, subtitle)?;
            doc.end("MainSubtitle")?;
        }
        doc.end("AssetList")?;
        doc.end("Reel")?;
    }
    doc.end("ReelList")?;

    if let Some(signature) = signature {
        write_signature(&mut doc, signature)?;
    }
    doc.end("CompositionPlaylist")?;
    Ok(doc.into_bytes())
}

fn reel_asset_body(doc: &mut XmlDocument, asset: &AssetEntry) -> Result<(), XmlError> {
    doc.text_element("Id", &urn(asset.id))?;
    doc.text_element("EditRate", &format!("{} 1", asset.edit_rate))?;
    doc.text_element("IntrinsicDuration", &asset.intrinsic_duration.to_string())?;
    doc.text_element("EntryPoint", &asset.entry_point.to_string())?;
    doc.text_element("Duration", &asset.duration.to_string())?;
    if let Some(hash) = &asset.hash {
        doc.text_element("Hash", hash)?;
    }
    Ok(())
}

fn pkl_xml(
    cpl: &CompositionPlaylist,
    pkl_id: Uuid,
    files: &[PackagedFile],
    signed: bool,
    signature: Option<&Signature>,
) -> Result<Vec<u8>, XmlError> {
    let ns = namespaces(cpl.standard);
    let mut doc = XmlDocument::new()?;

    doc.start("PackingList", &root_attributes(ns.pkl, signed))?;
    doc.text_element("Id", &urn(pkl_id))?;
    doc.text_element("AnnotationText", &cpl.annotation_text)?;
    doc.text_element("IssueDate", &issue_date(&cpl.issue_date))?;
    doc.text_element("Issuer", &cpl.issuer)?;
    doc.text_element("Creator", &cpl.creator)?;
    doc.start("AssetList", &[])?;
    for file in files {
        doc.start("Asset", &[])?;
        doc.text_element("Id", &urn(file.id))?;
        doc.text_element("Hash", &file.hash)?;
        doc.text_element("Size", &file.size.to_string())?;
        doc.text_element("Type", file.mime)?;
        doc.text_element("OriginalFileName", &file.path.to_string_lossy())?;
        doc.end("Asset")?;
    }
    doc.end("AssetList")?;

    if let Some(signature) = signature {
        write_signature(&mut doc, signature)?;
    }
    doc.end("PackingList")?;
    Ok(doc.into_bytes())
}

fn asset_map_xml(
    cpl: &CompositionPlaylist,
    (pkl_id, pkl_path, pkl_size): (Uuid, &Path, u64),
    files: &[PackagedFile],
) -> Result<Vec<u8>, XmlError> {
    let ns = namespaces(cpl.standard);
    let mut doc = XmlDocument::new()?;

    doc.start("AssetMap", &[("xmlns", ns.asset_map)])?;
    doc.text_element("Id", &urn(Uuid::new_v4()))?;
    doc.text_element("AnnotationText", &cpl.annotation_text)?;
    doc.text_element("Creator", &cpl.creator)?;
    doc.text_element("VolumeCount", "1")?;
    doc.text_element("IssueDate", &issue_date(&cpl.issue_date))?;
    doc.text_element("Issuer", &cpl.issuer)?;
    doc.start("AssetList", &[])?;
    asset_map_entry(&mut doc, pkl_id, pkl_path, pkl_size, true)?;
    for file in files {
        asset_map_entry(&mut doc, file.id, &file.path, file.size, false)?;
    }
    doc.end("AssetList")?;
    doc.end("AssetMap")?;
    Ok(doc.into_bytes())
}

fn asset_map_entry(
    doc: &mut XmlDocument,
    id: Uuid,
    path: &Path,
    size: u64,
    packing_list: bool,
) -> Result<(), XmlError> {
    doc.start("Asset", &[])?;
    doc.text_element("Id", &urn(id))?;
    if packing_list {
        doc.text_element("PackingList", "true")?;
    }
    doc.start("ChunkList", &[])?;
    doc.start("Chunk", &[])?;
    doc.text_element("Path", &path.to_string_lossy())?;
    doc.text_element("VolumeIndex", "1")?;
    doc.text_element("Offset", "0")?;
    doc.text_element("Length", &size.to_string())?;
    doc.end("Chunk")?;
    doc.end("ChunkList")?;
    doc.end("Asset")
}

fn volindex_xml(standard: Standard) -> Result<Vec<u8>, XmlError> {
    let mut doc = XmlDocument::new()?;
    doc.start("VolumeIndex", &[("xmlns", namespaces(standard).asset_map)])?;
    doc.text_element("Index", "1")?;
    doc.end("VolumeIndex")?;
    Ok(doc.into_bytes())
}

fn write_signature(doc: &mut XmlDocument, signature: &Signature) -> Result<(), XmlError> {
    doc.start("Signer", &[])?;
    doc.start("dsig:X509Data", &[])?;
    doc.start("dsig:X509IssuerSerial", &[])?;
    doc.text_element("dsig:X509IssuerName", &signature.subject)?;
    doc.text_element("dsig:X509SerialNumber", "1")?;
    doc.end("dsig:X509IssuerSerial")?;
    doc.text_element("dsig:X509SubjectName", &signature.subject)?;
    doc.end("dsig:X509Data")?;
    doc.end("Signer")?;

    doc.start("dsig:Signature", &[])?;
    doc.start("dsig:SignedInfo", &[])?;
    doc.empty(
        "dsig:CanonicalizationMethod",
        &[("Algorithm", "http://www.w3.org/TR/2001/REC-xml-c14n-20010315")],
    )?;
    doc.empty(
        "dsig:SignatureMethod",
        &[("Algorithm", "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256")],
    )?;
    doc.start("dsig:Reference", &[("URI", "")])?;
    doc.start("dsig:Transforms", &[])?;
    doc.empty(
        "dsig:Transform",
        &[("Algorithm", "http://www.w3.org/2000/09/xmldsig#enveloped-signature")],
    )?;
    doc.end("dsig:Transforms")?;
    doc.empty(
        "dsig:DigestMethod",
        &[("Algorithm", "http://www.w3.org/2001/04/xmlenc#sha256")],
    )?;
    doc.text_element("dsig:DigestValue", &signature.digest)?;
    doc.end("dsig:Reference")?;
    doc.end("dsig:SignedInfo")?;
    doc.text_element("dsig:SignatureValue", &signature.value)?;
    doc.start("dsig:KeyInfo", &[])?;
    doc.start("dsig:X509Data", &[])?;
    doc.text_element("dsig:X509Certificate", &signature.certificate)?;
    doc.end("dsig:X509Data")?;
    doc.end("dsig:KeyInfo")?;
    doc.end("dsig:Signature")
}

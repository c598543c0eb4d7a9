#![allow(dead_code)]

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use ssfiletable::catalogs::object_id_hash;
use tempfile::TempDir;

/// Header line printed by the survey simulator on detection files.
pub const DIA_HEADER: &str = "ObjID observationId FieldMJD AstRange(km) AstRangeRate(km/s) AstRA(deg) AstRARate(deg/day) AstDec(deg) AstDecRate(deg/day) Ast-Sun(J2000x)(km) Ast-Sun(J2000y)(km) Ast-Sun(J2000z)(km) Sun-Ast-Obs(deg) V Filtermag V(H=0) Filter";

pub const MPCORB_HEADER: &str = "S3MID,FORMAT,q,e,i,Omega,argperi,t_p,H,t_0,INDEX,N_PAR,MOID,COMPCODE";

/// A temporary directory removed when dropped.
pub struct Workspace {
    _dir: TempDir,
    root: Utf8PathBuf,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        Workspace { _dir: dir, root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn path(&self, name: &str) -> Utf8PathBuf {
        self.root.join(name)
    }

    pub fn write(&self, name: &str, content: &str) -> Utf8PathBuf {
        let path = self.path(name);
        fs::write(&path, content).unwrap();
        path
    }

    pub fn read(&self, name: &str) -> String {
        fs::read_to_string(self.path(name)).unwrap()
    }
}

/// One simulator detection line.
pub fn dia_line(obj: &str, visit: u32, mjd: &str, ra: &str, dec: &str, filter: &str) -> String {
    format!(
        "{obj} {visit} {mjd} 1.5e8 3.2 {ra} 0.1 {dec} 0.2 1e8 2e8 3e8 12.3 21.5 20.871 19.012 {filter}"
    )
}

/// A detection file with the simulator header.
pub fn dia_file(lines: &[String]) -> String {
    let mut content = String::from(DIA_HEADER);
    content.push('\n');
    for line in lines {
        content.push_str(line);
        content.push('\n');
    }
    content
}

/// One orbit line of the simulator orbit file.
pub fn orbit_line(designation: &str, h: &str) -> String {
    format!("{designation},COM,2.1,0.12,5.5,80.1,150.2,59000.5,{h},59853.0,1,6,0.01,MPCORB")
}

pub fn orbit_file(lines: &[String]) -> String {
    let mut content = String::from(MPCORB_HEADER);
    content.push('\n');
    for line in lines {
        content.push_str(line);
        content.push('\n');
    }
    content
}

pub fn key(object: &str) -> String {
    object_id_hash(object).to_string()
}
